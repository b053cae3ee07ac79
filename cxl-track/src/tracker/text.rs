// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::tracker::{EntityManager, Track};
use crate::{Id, SharedWriter, Writer};

/// A simple text logger to output messages to a Writer.
pub struct TextTracker {
    entity_manager: EntityManager,

    /// Writer to which all _log_ events will be written.
    writer: SharedWriter,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            writer: Rc::new(RefCell::new(writer)),
        }
    }

    fn write_line(&self, line: std::fmt::Arguments) {
        let mut writer = self.writer.borrow_mut();
        if let Err(e) = writer.write_fmt(line).and_then(|()| writer.write_all(b"\n")) {
            eprintln!("Failed to write track event: {e}");
        }
    }
}

/// Implementation for each [`Track`] event
impl Track for TextTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_log_enabled_at_level(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
    }

    fn enter(&self, id: Id, object: Id) {
        self.write_line(format_args!("{id}: enter {object}"));
    }

    fn exit(&self, id: Id, object: Id) {
        self.write_line(format_args!("{id}: exit {object}"));
    }

    fn value(&self, id: Id, value: f64) {
        self.write_line(format_args!("{id}: value {value}"));
    }

    fn create(&self, created_by: Id, id: Id, num_bytes: usize, req_type: i8, name: &str) {
        self.write_line(format_args!(
            "{created_by}: created {id}, {name}, {req_type}, {num_bytes} bytes"
        ));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.write_line(format_args!("{destroyed_by}: destroyed {id}"));
    }

    fn connect(&self, connect_from: Id, connect_to: Id) {
        self.write_line(format_args!("{connect_from}: connect to {connect_to}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.write_line(format_args!("{id}:{level}: {msg}"));
    }

    fn time(&self, set_by: Id, time_ns: f64) {
        self.entity_manager.set_time(time_ns);
        self.write_line(format_args!("{set_by}: set time to {time_ns:.1}ns"));
    }

    fn shutdown(&self) {
        if let Err(e) = self.writer.borrow_mut().flush() {
            eprintln!("Failed to flush tracker: {e}");
        }
    }
}
