// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Helper connection macros

pub use cxl_engine::sim_error;
pub use cxl_track::debug;
pub use paste::paste;

#[macro_export]
/// Connect an [OutPort](cxl_engine::port::OutPort) port to an
/// [InPort](cxl_engine::port::InPort)
///
/// Expands to a call to `connect_port_<from_port_name>()` on `$from` with the
/// result of `port_<to_port_name>()` on `$to` and so returns a `SimResult`.
macro_rules! connect_port {
    ($from:expr, $from_port_name:ident => $to:expr, $to_port_name:ident) => {{
        $crate::connect::debug!($from.entity ; "Connect {}.{} => {}.{}", $from, stringify!($from_port_name), $to, stringify!($to_port_name));
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name >]($to.[< port_ $to_port_name >]())
        }
    }};
}

#[macro_export]
/// Connect a tx port stored in a `RefCell<Option<>>`.
///
/// Fails if the component has already started running and taken the port.
macro_rules! connect_tx {
    ($port:expr, $fn:ident ; $port_state:ident) => {
        match $port.borrow_mut().as_mut() {
            Some(port) => port.$fn($port_state),
            None => $crate::connect::sim_error!("port already in use, cannot connect"),
        }
    };
}

#[macro_export]
/// Access an rx port stored in a `RefCell<Option<>>`.
///
/// Fails if the component has already started running and taken the port.
macro_rules! port_rx {
    ($port:expr, $fn:ident) => {
        match $port.borrow().as_ref() {
            Some(port) => port.$fn(),
            None => $crate::connect::sim_error!("port already in use, cannot connect"),
        }
    };
}

#[macro_export]
/// Take a variable out of a `RefCell<Option<>>`.
///
/// Returns an error from the enclosing function if it has already been taken.
macro_rules! take_option {
    ($var:expr) => {
        match $var.borrow_mut().take() {
            Some(value) => value,
            None => {
                return $crate::connect::sim_error!(format!(
                    "{} already taken",
                    stringify!($var)
                ));
            }
        }
    };
}
