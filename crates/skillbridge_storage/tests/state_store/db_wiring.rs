#![forbid(unsafe_code)]

use serde_json::{json, Map};
use skillbridge_contracts::state::StateAccessor;
use skillbridge_storage::state_store::StateStore;

fn attrs(v: serde_json::Value) -> Map<String, serde_json::Value> {
    v.as_object().cloned().unwrap()
}

#[test]
fn at_state_db_01_absent_entity_reads_as_none() {
    let s = StateStore::new_in_memory();
    assert!(s.get("device_tracker.paulus").is_none());
}

#[test]
fn at_state_db_02_writes_are_visible_to_the_next_read() {
    let s = StateStore::new_in_memory();
    s.set("device_tracker.paulus", "not_home", Map::new()).unwrap();
    assert_eq!(s.get("device_tracker.paulus").unwrap().state, "not_home");

    s.set(
        "device_tracker.paulus",
        "home",
        attrs(json!({"source_type": "gps"})),
    )
    .unwrap();
    let snap = s.get("device_tracker.paulus").unwrap();
    assert_eq!(snap.state, "home");
    assert_eq!(snap.attributes["source_type"], json!("gps"));
}

#[test]
fn at_state_db_03_remove_reports_presence() {
    let s = StateStore::new_in_memory();
    s.set("switch.test", "on", Map::new()).unwrap();
    assert!(s.remove("switch.test").unwrap());
    assert!(!s.remove("switch.test").unwrap());
    assert!(s.get("switch.test").is_none());
}

#[test]
fn at_state_db_04_shared_across_threads() {
    let s = std::sync::Arc::new(StateStore::new_in_memory());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let s = s.clone();
            std::thread::spawn(move || {
                s.set(&format!("sensor.t{i}"), i.to_string(), Map::new())
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(s.entity_ids().len(), 4);
    assert_eq!(s.get("sensor.t3").unwrap().state, "3");
}
