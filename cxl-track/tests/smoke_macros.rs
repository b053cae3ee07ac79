// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ensure that all version of each macro can be used

use cxl_track::entity::{Entity, toplevel};
use cxl_track::{
    Id, connect, create, create_id, debug, destroy, enter, error, exit, info, set_time,
    test_helpers, test_init, trace, value, warn,
};
use serial_test::serial;

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        #[serial]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top, 0, 0 bytes"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with 1 argument")]);

            $macro!(top ; "Loc with {}, {} arguments", 1, 1 + 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl,": Loc with 1, 2 arguments")]);

            drop(top);
            test_helpers::check_and_clear(&test_tracker, &["0: destroyed 100"]);
        }
    );
}

build_with_entity!(trace_with_entity, trace, "TRACE");
build_with_entity!(info_with_entity, info, "INFO");
build_with_entity!(debug_with_entity, debug, "DEBUG");
build_with_entity!(warn_with_entity, warn, "WARN");
build_with_entity!(error_with_entity, error, "ERROR");

#[test]
#[serial]
fn hierarchy() {
    let (test_tracker, tracker) = test_init!(10);

    let top = toplevel(&tracker, "top");
    let bridge = std::rc::Rc::new(Entity::new(&top, "bridge"));
    let port = Entity::new(&bridge, "cpu_side_port");
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 10, top, 0, 0 bytes",
            "10: created 11, top::bridge, 0, 0 bytes",
            "11: created 12, top::bridge::cpu_side_port, 0, 0 bytes",
        ],
    );
    assert_eq!(port.full_name(), "top::bridge::cpu_side_port");
    assert_eq!(format!("{port}"), "top::bridge::cpu_side_port");

    drop(port);
    test_helpers::check_and_clear(&test_tracker, &["11: destroyed 12"]);
}

#[test]
#[serial]
fn create_destroy_objects() {
    let (test_tracker, tracker) = test_init!(20);

    let top = toplevel(&tracker, "top");
    let id = create_id!(top);
    assert_eq!(id, Id(21));

    create!(top ; id, 64, 1);
    destroy!(top ; id);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 20, top, 0, 0 bytes",
            "20: created 21, 21, 1, 64 bytes",
            "20: destroyed 21",
        ],
    );
}

#[test]
#[serial]
fn enter_exit_connect() {
    let (test_tracker, tracker) = test_init!(40);

    let top = toplevel(&tracker, "top");
    let a = Entity::new(&top, "a");
    let b = Entity::new(&top, "b");
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 40, top, 0, 0 bytes",
            "40: created 41, top::a, 0, 0 bytes",
            "40: created 42, top::b, 0, 0 bytes",
        ],
    );

    enter!(a ; Id(99));
    exit!(a ; Id(99));
    connect!(a ; b);
    value!(b ; 3);
    set_time!(top ; 12.0);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "41: 99 entered",
            "41: 99 exited",
            "41: connect to 42",
            "42: value 3",
            "40: set time 12.0ns",
        ],
    );
}
