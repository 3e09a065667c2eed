//! # Manifest Normalizer Integration Tests
//!
//! Drives the Burble parser and controller with realistic payloads: change
//! detection, slot accounting, turning detection and organizer clustering.

use lib_common::configs::SettingsConfig;
use lib_common::feeds::burble::ManifestParser;
use project_tests::{dropzone, grouped, load, manifest, sport};
use serde_json::json;

fn parser() -> ManifestParser {
    ManifestParser::new(vec!["organizer".to_string()], 5, 0)
}

#[test]
fn same_payload_twice_is_not_a_change() {
    let state = dropzone(SettingsConfig::default());
    let raw = manifest(vec![
        load(1, "Otter 1", 15, vec![vec![sport(1, "Alice", "Fun Jump")]]),
        load(2, "Otter 2", 35, vec![vec![sport(2, "Bob", "Fun Jump")]]),
    ]);

    assert!(state.burble().apply_payload(&raw).unwrap());
    let first = state.burble().loads();
    assert!(!state.burble().apply_payload(&raw).unwrap());
    assert_eq!(state.burble().loads(), first);
    assert_eq!(first[0].aircraft_name, "Otter");
    assert_eq!(first[0].load_number, "1");
}

#[test]
fn private_slots_consume_the_reserve() {
    let public = |n: i64| sport(n, &format!("Public {}", n), "Fun Jump");
    let private = |n: i64| {
        json!({ "id": n, "name": format!("Private {}", n), "type": "Sport Jumper", "jump": "Fun Jump",
                "is_public": false, "is_private": true })
    };
    let raw = json!({ "loads": [ {
        "id": 9, "name": "Caravan 4", "time_left": 25, "max_slots": 10, "reserve_slots": 4,
        "groups": [[public(1)], [public(2)], [public(3)], [private(4)], [private(5)]]
    } ] });

    let loads = parser().parse(&raw).unwrap();
    assert_eq!(loads[0].slots_available, 3);
    assert_eq!(loads[0].sport_jumpers.len(), 5);
}

#[test]
fn jumpers_on_consecutive_loads_are_turning() {
    let raw = manifest(vec![
        load(1, "Otter 1", 10, vec![vec![sport(1, "Alice", "Fun Jump")]]),
        load(
            2,
            "Otter 2",
            40,
            vec![
                vec![sport(1, "Alice", "Fun Jump")],
                vec![sport(9, "Alice", "Hop & Pop")],
                vec![sport(2, "Bob", "Fun Jump")],
            ],
        ),
    ]);

    let loads = parser().parse(&raw).unwrap();
    assert!(!loads[0].sport_jumpers[0].is_turning);
    let second: Vec<_> = loads[1].sport_jumpers.iter().map(|j| (j.name.as_str(), j.is_turning)).collect();
    assert_eq!(second, vec![("Alice", true), ("Alice", true), ("Bob", false)]);
}

#[test]
fn loads_hidden_by_call_time_still_count_for_turning() {
    let raw = manifest(vec![
        load(1, "Otter 1", 3, vec![vec![sport(1, "Alice", "Fun Jump")]]),
        load(2, "Otter 2", 20, vec![vec![sport(1, "Alice", "Fun Jump")], vec![sport(2, "Bob", "Fun Jump")]]),
    ]);

    let loads = ManifestParser::new(vec!["organizer".to_string()], 5, 5).parse(&raw).unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].load_number, "2");
    let turning: Vec<_> = loads[0].sport_jumpers.iter().map(|j| (j.name.as_str(), j.is_turning)).collect();
    assert_eq!(turning, vec![("Alice", true), ("Bob", false)]);
}

#[test]
fn organizer_collapses_a_numbered_group() {
    let with_organizer = manifest(vec![load(
        1,
        "Otter 1",
        20,
        vec![
            vec![grouped(1, "Zed", "Fun Jump", "Smith-02")],
            vec![grouped(2, "Smith", "Organizer", "Smith-01")],
            vec![grouped(3, "amy", "Fun Jump", "Smith-02")],
        ],
    )]);
    let loads = parser().parse(&with_organizer).unwrap();
    let jumpers = &loads[0].sport_jumpers;
    assert_eq!(jumpers.len(), 1);
    assert!(jumpers[0].is_organizer);
    let members: Vec<_> = jumpers[0].group_members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(members, vec!["amy", "Zed"]);

    let without = manifest(vec![load(
        1,
        "Otter 1",
        20,
        vec![
            vec![grouped(1, "Zed", "Fun Jump", "Smith-02")],
            vec![grouped(2, "Smith", "Fun Jump", "Smith-01")],
        ],
    )]);
    let loads = parser().parse(&without).unwrap();
    assert_eq!(loads[0].sport_jumpers.len(), 2);
    assert!(loads[0].sport_jumpers.iter().all(|j| j.group_members.is_empty()));
}

#[test]
fn malformed_payloads_fail_without_touching_state() {
    let state = dropzone(SettingsConfig::default());
    let good = manifest(vec![load(1, "Otter 1", 20, vec![vec![sport(1, "Alice", "Fun Jump")]])]);
    state.burble().apply_payload(&good).unwrap();

    assert!(state.burble().apply_payload(&json!({ "loads": "none" })).is_err());
    assert!(state.burble().apply_payload(&json!({ "loads": [ { "groups": [] } ] })).is_err());
    assert_eq!(state.burble().loads().len(), 1);
}
