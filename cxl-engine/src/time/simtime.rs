// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The owner of all clocks within a simulation.

use std::rc::Rc;

use cxl_track::entity::Entity;
use cxl_track::set_time;

use super::clock::Clock;
use crate::time::clock::TaskWaker;

/// The overall owner of time within a simulation.
///
/// Contains all Clocks and the current simulation time in ns.
#[derive(Clone)]
pub struct SimTime {
    pub entity: Rc<Entity>,

    current_ns: f64,

    /// Clocks are created as required, one per frequency.
    clocks: Vec<Clock>,
}

impl SimTime {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "time")),
            current_ns: 0.0,
            clocks: Vec::new(),
        }
    }

    pub fn get_clock(&mut self, freq_mhz: f64) -> Clock {
        for clock in &self.clocks {
            if clock.freq_mhz() == freq_mhz {
                return clock.clone();
            }
        }
        let clock = Clock::new(freq_mhz);
        self.clocks.push(clock.clone());
        clock
    }

    /// Choose the clock with the next time, move it to that time and return
    /// the associated Wakers.
    pub fn advance_time(&mut self) -> Option<Vec<TaskWaker>> {
        let next_clock = self.clocks.iter().min_by(|a, b| a.cmp(b))?;
        let clock_time = next_clock.shared_state.waiting_times.borrow_mut().pop()?;

        let next_ns = next_clock.to_ns(&clock_time);
        if self.current_ns != next_ns {
            set_time!(self.entity ; next_ns);
            self.current_ns = next_ns;
        }
        next_clock.shared_state.advance_time(clock_time);
        next_clock.shared_state.waiting.borrow_mut().pop()
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.current_ns
    }

    /// The simulation can exit if all scheduled tasks can exit.
    #[must_use]
    pub fn can_exit(&self) -> bool {
        self.clocks.iter().all(|clock| {
            clock
                .shared_state
                .waiting
                .borrow()
                .iter()
                .flatten()
                .all(|task_waker| task_waker.exit_policy.can_exit())
        })
    }
}

#[cfg(test)]
mod tests {
    use cxl_track::entity::toplevel;
    use cxl_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn clock_created_once() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);

        let _clk2 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);
    }

    #[test]
    fn create_different_clocks() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk1 = time.get_clock(1000.0);
        assert_eq!(time.clocks.len(), 1);

        let _clk2 = time.get_clock(1800.0);
        assert_eq!(time.clocks.len(), 2);
    }

    #[test]
    fn nothing_to_advance() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");

        let mut time = SimTime::new(&top);
        let _clk = time.get_clock(1000.0);
        assert!(time.advance_time().is_none());
        assert!(time.can_exit());
    }
}
