// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Single-threaded executor for simulation tasks.
//!
//! Tasks are polled when they are first spawned and then only when woken. When
//! no task can make progress time is advanced to the next tick at which a task
//! is waiting on a [Clock].
//!
//! The simulation finishes when there are no runnable tasks and all tasks
//! waiting on clocks are allowed to exit (see
//! [ExitPolicy](crate::time::clock::ExitPolicy)).

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use cxl_track::entity::Entity;

use crate::time::clock::Clock;
use crate::time::simtime::SimTime;
use crate::types::SimResult;

static VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_raw_waker, wake_task, wake_task_by_ref, drop_raw_waker);

fn task_raw_waker(task: Rc<Task>) -> RawWaker {
    let ptr = Rc::into_raw(task) as *const ();
    RawWaker::new(ptr, &VTABLE)
}

fn waker_for_task(task: Rc<Task>) -> Waker {
    // The executor is single threaded and wakers never leave it, so the
    // non-atomic reference count inside the waker is sound.
    unsafe { Waker::from_raw(task_raw_waker(task)) }
}

unsafe fn clone_raw_waker(data: *const ()) -> RawWaker {
    unsafe {
        let ptr = data as *const Task;
        Rc::increment_strong_count(ptr);
        RawWaker::new(data, &VTABLE)
    }
}

unsafe fn wake_task(data: *const ()) {
    unsafe {
        let rc_task = Rc::from_raw(data as *const Task);
        let executor_state = rc_task.executor_state.clone();
        executor_state.new_tasks.borrow_mut().push(rc_task);
    }
}

unsafe fn wake_task_by_ref(data: *const ()) {
    unsafe {
        let ptr = data as *const Task;
        Rc::increment_strong_count(ptr);
        wake_task(data);
    }
}

unsafe fn drop_raw_waker(data: *const ()) {
    unsafe {
        drop(Rc::from_raw(data as *const Task));
    }
}

struct Task {
    future: RefCell<Pin<Box<dyn Future<Output = SimResult>>>>,
    complete: Cell<bool>,
    executor_state: Rc<ExecutorState>,
}

impl Task {
    fn new(
        future: impl Future<Output = SimResult> + 'static,
        executor_state: Rc<ExecutorState>,
    ) -> Task {
        Task {
            future: RefCell::new(Box::pin(future)),
            complete: Cell::new(false),
            executor_state,
        }
    }

    fn poll(&self, context: &mut Context) -> Poll<SimResult> {
        self.future.borrow_mut().as_mut().poll(context)
    }
}

struct ExecutorState {
    new_tasks: RefCell<Vec<Rc<Task>>>,
    time: RefCell<SimTime>,
}

impl ExecutorState {
    fn new(top: &Rc<Entity>) -> Self {
        Self {
            new_tasks: RefCell::new(Vec::new()),
            time: RefCell::new(SimTime::new(top)),
        }
    }
}

/// Single-threaded executor
///
/// This is a thin-wrapper (using [`Rc`]) around the real executor, so that this
/// struct can be cloned and passed around.
#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    state: Rc<ExecutorState>,
}

impl Executor {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .new_tasks
            .borrow_mut()
            .push(Rc::new(Task::new(future, self.state.clone())));
    }

    pub fn run(&self, finished: &Rc<Cell<bool>>) -> SimResult {
        loop {
            self.step(finished)?;
            if finished.get() {
                break;
            }

            if self.state.new_tasks.borrow().is_empty() {
                let wakers = {
                    let mut time = self.state.time.borrow_mut();
                    if time.can_exit() {
                        break;
                    }
                    time.advance_time()
                };

                match wakers {
                    Some(wakers) => {
                        for task_waker in wakers {
                            task_waker.waker.wake();
                        }
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn step(&self, finished: &Rc<Cell<bool>>) -> SimResult {
        // Take all tasks woken or created since the last step
        let tasks = std::mem::take(&mut *self.state.new_tasks.borrow_mut());
        let mut tasks = tasks.into_iter();

        while let Some(task) = tasks.next() {
            if finished.get() {
                // Keep the remaining tasks so that the simulation can be resumed
                let mut new_tasks = self.state.new_tasks.borrow_mut();
                new_tasks.push(task);
                new_tasks.extend(tasks);
                break;
            }

            // A task can be woken more than once before it is polled
            if task.complete.get() {
                continue;
            }

            let waker = waker_for_task(task.clone());
            let mut context = Context::from_waker(&waker);

            match task.poll(&mut context) {
                Poll::Ready(Err(e)) => {
                    return Err(e);
                }
                Poll::Ready(Ok(())) => {
                    task.complete.set(true);
                }
                Poll::Pending => {
                    // Task will have parked itself waiting somewhere
                }
            }
        }
        Ok(())
    }

    pub fn get_clock(&self, freq_mhz: f64) -> Clock {
        self.state.time.borrow_mut().get_clock(freq_mhz)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.state.time.borrow().time_now_ns()
    }
}

/// `Spawner` spawns new futures into the executor.
#[derive(Clone)]
pub struct Spawner {
    state: Rc<ExecutorState>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .new_tasks
            .borrow_mut()
            .push(Rc::new(Task::new(future, self.state.clone())));
    }
}

#[must_use]
pub fn new_executor_and_spawner(top: &Rc<Entity>) -> (Executor, Spawner) {
    let state = Rc::new(ExecutorState::new(top));
    let entity = Rc::new(Entity::new(top, "executor"));
    (
        Executor {
            entity,
            state: state.clone(),
        },
        Spawner { state },
    )
}
