// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Identifiers used by _log_ / _trace_ events.

/// Ids that should be unique across the simulation
///
/// Each _log_/_trace_ event within the application is given a unique id to
/// identify it. There are two reserved id values: [NO_ID](crate::NO_ID)
/// and [ROOT](crate::ROOT)
#[derive(Copy, Clone, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Id(pub u64);

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Objects that can be identified in _trace_ events.
pub trait Unique {
    /// Return the id of an object. This is used in logging.
    fn id(&self) -> Id;
}

impl Unique for Id {
    fn id(&self) -> Id {
        *self
    }
}

impl Unique for u64 {
    fn id(&self) -> Id {
        Id(*self)
    }
}

impl Unique for usize {
    fn id(&self) -> Id {
        Id(*self as u64)
    }
}
