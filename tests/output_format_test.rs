//! Tests for the serialized output formats.
//!
//! These pin the JSON and YAML documents consumers parse: an object keyed by
//! event name, each entry holding `implementations` and `properties`.

use std::path::PathBuf;

use serde_json::Value;
use trackscan::analyze_directory_blocking;
use trackscan::event::EventMap;
use trackscan::report::{render_json, render_yaml};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn aggregate_events() -> EventMap {
    analyze_directory_blocking::<&str>(&testdata_path().join("aggregate"), &[], &[])
        .expect("scan should succeed")
}

#[test]
fn test_json_document_shape() {
    let json: Value = serde_json::from_str(&render_json(&aggregate_events()).unwrap()).unwrap();

    let entry = &json["Shared"];
    let first = &entry["implementations"][0];
    assert_eq!(first["path"], "a.js");
    assert_eq!(first["line"], 2);
    assert_eq!(first["function"], "first");
    assert_eq!(first["destination"], "segment");

    let plan = &entry["properties"]["plan"];
    assert_eq!(plan["kind"], "primitive");
    assert_eq!(plan["type"], "number");
}

#[test]
fn test_json_round_trips_into_event_map() {
    let events = aggregate_events();
    let back: EventMap = serde_json::from_str(&render_json(&events).unwrap()).unwrap();
    assert_eq!(back, events);
}

#[test]
fn test_yaml_matches_json() {
    let events = aggregate_events();
    let from_yaml: Value = serde_yaml::from_str(&render_yaml(&events).unwrap()).unwrap();
    let from_json: Value = serde_json::from_str(&render_json(&events).unwrap()).unwrap();
    assert_eq!(from_yaml, from_json);
}
