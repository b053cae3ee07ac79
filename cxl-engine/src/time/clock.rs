// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A clock that tasks can wait on.
//!
//! Time on a clock is a count of ticks.

use core::cmp::Ordering;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// ClockTick structure for representing a number of Clock ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTick {
    /// Clock ticks.
    tick: u64,
}

impl ClockTick {
    #[must_use]
    pub fn new() -> Self {
        Self { tick: 0 }
    }

    /// Get the current clock tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Change the value of `tick`.
    pub fn set_tick(&mut self, tick: u64) -> ClockTick {
        self.tick = tick;
        *self
    }

    /// Return the tick `ticks` after this one.
    #[must_use]
    pub fn plus(&self, ticks: u64) -> ClockTick {
        ClockTick {
            tick: self.tick + ticks,
        }
    }

    /// Number of ticks from `earlier` to this tick (zero if `earlier` is
    /// later).
    #[must_use]
    pub fn ticks_since(&self, earlier: ClockTick) -> u64 {
        self.tick.saturating_sub(earlier.tick)
    }
}

impl From<u64> for ClockTick {
    fn from(tick: u64) -> Self {
        Self { tick }
    }
}

impl std::fmt::Display for ClockTick {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.tick)
    }
}

/// Whether the simulation is allowed to finish while a task is still waiting
/// on the clock.
#[derive(Clone)]
pub enum ExitPolicy {
    /// The wait must complete before the simulation can finish.
    Required,

    /// A background task that would run forever. The simulation can finish
    /// without it.
    Background,

    /// Required until the flag is set, at which point the wait no longer
    /// matters to anyone.
    Released(Rc<Cell<bool>>),
}

impl ExitPolicy {
    #[must_use]
    pub fn can_exit(&self) -> bool {
        match self {
            ExitPolicy::Required => false,
            ExitPolicy::Background => true,
            ExitPolicy::Released(released) => released.get(),
        }
    }
}

pub struct TaskWaker {
    /// The Waker to use to make a task active again.
    pub waker: Waker,

    /// Whether the simulation can finish without waking this task.
    pub exit_policy: ExitPolicy,
}

#[derive(Clone)]
/// State representing a clock.
pub struct Clock {
    /// Frequency of the clock in MHz.
    /// *Note*: Should never be changed as it is registered at this frequency.
    freq_mhz: f64,

    pub shared_state: Rc<ClockState>,
}

/// Shared state between futures using a Clock and the Clock itself.
pub struct ClockState {
    now: RefCell<ClockTick>,

    /// Queue of futures waiting for the right time.
    pub waiting: RefCell<Vec<Vec<TaskWaker>>>,

    /// Queue of times at which those futures are to be woken. This is kept
    /// sorted by time so that the last entry is the next to be woken.
    pub waiting_times: RefCell<Vec<ClockTick>>,
}

impl ClockState {
    fn schedule(&self, schedule_time: ClockTick, cx: &mut Context<'_>, exit_policy: ExitPolicy) {
        let task_waker = TaskWaker {
            waker: cx.waker().clone(),
            exit_policy,
        };

        let mut waiting_times = self.waiting_times.borrow_mut();
        let mut waiting = self.waiting.borrow_mut();
        if let Some(index) = waiting_times.iter().position(|&x| x == schedule_time) {
            // Time already exists, add this task
            waiting[index].push(task_waker);
        } else {
            // Time not found, insert so that the vector remains sorted latest first
            match waiting_times.iter().position(|x| *x < schedule_time) {
                Some(index) => {
                    waiting_times.insert(index, schedule_time);
                    waiting.insert(index, vec![task_waker]);
                }
                None => {
                    waiting_times.push(schedule_time);
                    waiting.push(vec![task_waker]);
                }
            };
        }
    }

    /// Move the clock to `to_time`.
    pub fn advance_time(&self, to_time: ClockTick) {
        let mut now = self.now.borrow_mut();
        assert!(to_time >= *now, "Time moving backwards");
        *now = to_time;
    }
}

impl Clock {
    /// Create a new [Clock] at the specified frequency.
    #[must_use]
    pub fn new(freq_mhz: f64) -> Self {
        let shared_state = Rc::new(ClockState {
            now: RefCell::new(ClockTick::new()),
            waiting: RefCell::new(Vec::new()),
            waiting_times: RefCell::new(Vec::new()),
        });

        Self {
            freq_mhz,
            shared_state,
        }
    }

    /// Returns the clocks frequency in MHz.
    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    /// Returns the current [ClockTick].
    #[must_use]
    pub fn tick_now(&self) -> ClockTick {
        *self.shared_state.now.borrow()
    }

    /// Returns the current time in `ns`.
    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        let now = *self.shared_state.now.borrow();
        self.to_ns(&now)
    }

    /// Returns the time in `ns` of the next event registered with this clock.
    #[must_use]
    pub fn time_of_next(&self) -> f64 {
        match self.shared_state.waiting_times.borrow().last() {
            Some(clock_time) => self.to_ns(clock_time),
            None => f64::MAX,
        }
    }

    /// Convert the given [ClockTick] to a time in `ns` for this clock.
    #[must_use]
    pub fn to_ns(&self, clock_time: &ClockTick) -> f64 {
        clock_time.tick as f64 / self.freq_mhz * 1000.0
    }

    fn delay(&self, ticks: u64, exit_policy: ExitPolicy) -> ClockDelay {
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until: self.tick_now().plus(ticks),
            state: ClockDelayState::Pending,
            exit_policy,
        }
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: u64) -> ClockDelay {
        self.delay(ticks, ExitPolicy::Required)
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks. However, if the remainder of the simulation
    /// completes then this future is allowed to not complete. This allows the
    /// user to create tasks that can run continuously as long as the rest of
    /// the simulation continues to run.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_exit(&self, ticks: u64) -> ClockDelay {
        self.delay(ticks, ExitPolicy::Background)
    }

    /// Returns a [ClockDelay] future which keeps the simulation running until
    /// either it completes or `released` is set. Once released, the
    /// simulation may finish without this future completing.
    ///
    /// Typically used for watchdogs that become irrelevant once the thing
    /// they watch has happened.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_release(&self, ticks: u64, released: &Rc<Cell<bool>>) -> ClockDelay {
        self.delay(ticks, ExitPolicy::Released(released.clone()))
    }
}

/// The default clocks is simply to use a 1GHz clock so ticks are 1ns.
impl Default for Clock {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

/// The comparison operators for Clocks - use the next pending Waker time.
impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        self.time_of_next() == other.time_of_next()
    }
}
impl Eq for Clock {}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.time_of_next() < other.time_of_next() {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Possible states of a ClockDelay.
enum ClockDelayState {
    Pending,
    Running,
    Done,
}

/// Future returned by the clock to manage advancing time using async functions.
pub struct ClockDelay {
    shared_state: Rc<ClockState>,
    until: ClockTick,
    state: ClockDelayState,
    exit_policy: ExitPolicy,
}

impl Future for ClockDelay {
    type Output = ();
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            ClockDelayState::Pending => {
                if self.until <= *self.shared_state.now.borrow() {
                    self.state = ClockDelayState::Done;
                    return Poll::Ready(());
                }
                let exit_policy = self.exit_policy.clone();
                self.shared_state.schedule(self.until, cx, exit_policy);
                self.state = ClockDelayState::Running;
                Poll::Pending
            }
            ClockDelayState::Running => {
                // Only complete once time has actually reached the target. The
                // task may have been woken for some other reason.
                if *self.shared_state.now.borrow() >= self.until {
                    self.state = ClockDelayState::Done;
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
            ClockDelayState::Done => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_to_ns() {
        let clk_ghz = Clock::new(1000.0);
        assert_eq!(1.0, clk_ghz.to_ns(&ClockTick::new().set_tick(1)));

        let slow_clk = Clock::new(0.5);
        assert_eq!(2000.0, slow_clk.to_ns(&ClockTick::new().set_tick(1)));
    }

    #[test]
    fn tick_arithmetic() {
        let t = ClockTick::from(10);
        assert_eq!(t.plus(5).tick(), 15);
        assert_eq!(t.plus(5).ticks_since(t), 5);
        assert_eq!(t.ticks_since(t.plus(5)), 0);
    }

    #[test]
    fn exit_policies() {
        let released = Rc::new(Cell::new(false));
        let policy = ExitPolicy::Released(released.clone());
        assert!(!policy.can_exit());
        released.set(true);
        assert!(policy.can_exit());
        assert!(ExitPolicy::Background.can_exit());
        assert!(!ExitPolicy::Required.can_exit());
    }
}
