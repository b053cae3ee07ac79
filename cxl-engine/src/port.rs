// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ports
//!
//! An [OutPort] is connected to exactly one [InPort]. They share a
//! [PortState] which can hold one value. A `put()` completes once the value
//! has been taken by a `get()` at the other end, so a stalled receiver
//! back-pressures the sender.

use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use cxl_track::connect;
use cxl_track::entity::Entity;
use futures::Future;
use futures::future::FusedFuture;

use crate::sim_error;
use crate::traits::SimObject;
use crate::types::{SimError, SimResult};

pub type PortStateResult<T> = Result<Rc<PortState<T>>, SimError>;
pub type PortGetResult<T> = Result<PortGet<T>, SimError>;
pub type PortPutResult<T> = Result<PortPut<T>, SimError>;

pub struct PortState<T>
where
    T: SimObject,
{
    value: RefCell<Option<T>>,
    waiting_get: RefCell<Option<Waker>>,
    waiting_put: RefCell<Option<Waker>>,
    pub in_port_entity: Rc<Entity>,
}

impl<T> PortState<T>
where
    T: SimObject,
{
    fn new(in_port_entity: Rc<Entity>) -> Self {
        Self {
            value: RefCell::new(None),
            waiting_get: RefCell::new(None),
            waiting_put: RefCell::new(None),
            in_port_entity,
        }
    }
}

pub struct InPort<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    state: Rc<PortState<T>>,
    connected: RefCell<bool>,
}

impl<T> fmt::Display for InPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> InPort<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        Self {
            entity: entity.clone(),
            state: Rc::new(PortState::new(entity)),
            connected: RefCell::new(false),
        }
    }

    /// Return the state to be shared with an [OutPort].
    ///
    /// Can only be called once as an [InPort] only has one driver.
    pub fn state(&self) -> PortStateResult<T> {
        if *self.connected.borrow() {
            return sim_error!(format!("{self} already connected"));
        }

        *self.connected.borrow_mut() = true;
        Ok(self.state.clone())
    }

    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn get(&self) -> PortGetResult<T> {
        if !*self.connected.borrow() {
            return sim_error!(format!("{self} not connected"));
        }

        Ok(PortGet {
            state: self.state.clone(),
            done: false,
        })
    }
}

pub struct OutPort<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    state: Option<Rc<PortState<T>>>,
}

impl<T> fmt::Display for OutPort<T>
where
    T: SimObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> OutPort<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        Self {
            entity,
            state: None,
        }
    }

    pub fn connect(&mut self, port_state: PortStateResult<T>) -> SimResult {
        let port_state = port_state?;

        if self.state.is_some() {
            return sim_error!(format!("{self} already connected"));
        }
        connect!(self.entity ; port_state.in_port_entity);
        self.state = Some(port_state);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn put(&self, value: T) -> PortPutResult<T> {
        let state = match self.state.as_ref() {
            Some(s) => s.clone(),
            None => return sim_error!(format!("{self} not connected")),
        };
        Ok(PortPut {
            state,
            value: Some(value),
            done: false,
        })
    }
}

pub struct PortPut<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    value: Option<T>,
    done: bool,
}

// The value is never pinned in place
impl<T> Unpin for PortPut<T> where T: SimObject {}

impl<T> Future for PortPut<T>
where
    T: SimObject,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.value.take() {
            if self.state.value.borrow().is_some() {
                // Another put has not been consumed yet, try again when it has
                self.value = Some(value);
                *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
                return Poll::Pending;
            }

            *self.state.value.borrow_mut() = Some(value);
            if let Some(waker) = self.state.waiting_get.borrow_mut().take() {
                waker.wake();
            }
            *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        } else if self.state.value.borrow().is_some() {
            // Woken before the value has been consumed
            *self.state.waiting_put.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        } else {
            self.done = true;
            Poll::Ready(())
        }
    }
}

impl<T> FusedFuture for PortPut<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

pub struct PortGet<T>
where
    T: SimObject,
{
    state: Rc<PortState<T>>,
    done: bool,
}

impl<T> Future for PortGet<T>
where
    T: SimObject,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let value = self.state.value.borrow_mut().take();
        if let Some(value) = value {
            self.done = true;
            if let Some(waker) = self.state.waiting_put.borrow_mut().take() {
                waker.wake();
            }
            Poll::Ready(value)
        } else {
            *self.state.waiting_get.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for PortGet<T>
where
    T: SimObject,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
