//! End-to-end tests for the file-backed accumulator.

use std::fs;
use std::sync::Arc;
use std::thread;

use chrono::Duration;
use tempfile::tempdir;
use wattkeep::identifier::MAX_IDENTIFIER_LEN;
use wattkeep::{Clock, Config, EnergyAccumulator, ManualClock, RecordStore};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn open(root: &std::path::Path, clock: &Arc<ManualClock>) -> EnergyAccumulator {
    EnergyAccumulator::open_with_clock(Config::at(root), clock.clone()).unwrap()
}

/// Empty root, baseline, one hour at 500 W, read back, traversal attempt.
#[test]
fn test_ups_scenario() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("records");
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(&root, &clock);

    assert!(approx(acc.calculate("ups-001", 500.0).unwrap(), 0.0));
    clock.advance(Duration::hours(1));
    assert!(approx(acc.calculate("ups-001", 500.0).unwrap(), 500.0));
    assert!(approx(acc.get("ups-001").unwrap(), 500.0));

    let err = acc.calculate("../etc", 100.0).unwrap_err();
    assert!(err.is_invalid_identifier());
    assert!(!dir.path().join("etc.txt").exists());
    assert!(!root.join("etc.txt").exists());

    let content = fs::read_to_string(root.join("ups-001.txt")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], clock.now().timestamp_millis().to_string());
    assert_eq!(lines[1], "500.000000");
    assert!(content.ends_with('\n'));
}

#[test]
fn test_first_sample_persists_zero() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(dir.path(), &clock);

    assert!(approx(acc.calculate("pdu-7", 1234.5).unwrap(), 0.0));
    let content = fs::read_to_string(dir.path().join("pdu-7.txt")).unwrap();
    assert!(content.ends_with("\n0.000000\n"));
}

#[test]
fn test_path_escape_creates_nothing() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("records");
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(&root, &clock);

    for id in ["../x", "a/b", ".", "", "..", "..\\x", ".env"] {
        let err = acc.calculate(id, 10.0).unwrap_err();
        assert!(err.is_invalid_identifier(), "{id:?} was not rejected");
    }

    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    let outside: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(outside, vec![std::ffi::OsString::from("records")]);
}

/// The longest accepted identifier still fits its temporary file name.
#[test]
fn test_longest_identifier_is_persisted() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(dir.path(), &clock);
    let id = "a".repeat(MAX_IDENTIFIER_LEN);

    assert!(approx(acc.calculate(&id, 100.0).unwrap(), 0.0));
    clock.advance(Duration::hours(1));
    assert!(approx(acc.calculate(&id, 100.0).unwrap(), 100.0));
    assert!(dir.path().join(format!("{id}.txt")).is_file());
    assert_eq!(acc.devices().unwrap(), vec![id.clone()]);

    assert!(acc.calculate(&format!("{id}a"), 100.0).unwrap_err().is_invalid_identifier());
}

/// A fresh instance on the same root sees what the previous one persisted.
#[test]
fn test_restart_recovery() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());

    {
        let acc = open(dir.path(), &clock);
        acc.calculate("ups-001", 1000.0).unwrap();
        clock.advance(Duration::minutes(90));
        assert!(approx(acc.calculate("ups-001", 1000.0).unwrap(), 1500.0));
    }

    let restarted = open(dir.path(), &clock);
    assert!(approx(restarted.get("ups-001").unwrap(), 1500.0));

    // Integration continues from the recovered total.
    clock.advance(Duration::minutes(30));
    assert!(approx(restarted.calculate("ups-001", 1000.0).unwrap(), 2000.0));
    assert_eq!(restarted.devices().unwrap(), vec!["ups-001".to_string()]);
}

#[test]
fn test_two_instances_share_state() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let a = open(dir.path(), &clock);
    let b = open(dir.path(), &clock);

    a.calculate("ups-001", 200.0).unwrap();
    clock.advance(Duration::hours(1));
    a.calculate("ups-001", 200.0).unwrap();
    assert!(approx(b.get("ups-001").unwrap(), 200.0));
}

#[test]
fn test_negative_gate_leaves_record_untouched() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(dir.path(), &clock);

    acc.calculate("ups-001", 100.0).unwrap();
    clock.advance(Duration::hours(1));
    acc.calculate("ups-001", 100.0).unwrap();
    let before = fs::read_to_string(dir.path().join("ups-001.txt")).unwrap();

    clock.advance(Duration::hours(1));
    let err = acc.calculate("ups-001", -1.0).unwrap_err();
    assert!(err.is_validation());

    let after = fs::read_to_string(dir.path().join("ups-001.txt")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_clock_skew_does_not_rewrite() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = open(dir.path(), &clock);

    acc.calculate("ups-001", 100.0).unwrap();
    clock.advance(Duration::hours(1));
    acc.calculate("ups-001", 100.0).unwrap();
    let before = fs::read_to_string(dir.path().join("ups-001.txt")).unwrap();

    clock.advance(Duration::hours(-2));
    assert!(approx(acc.calculate("ups-001", 100.0).unwrap(), 100.0));
    let after = fs::read_to_string(dir.path().join("ups-001.txt")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_concurrent_devices_and_readers() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = Arc::new(open(dir.path(), &clock));

    let devices: Vec<String> = (0..8).map(|i| format!("ups-{i:03}")).collect();
    for id in &devices {
        acc.calculate(id, 100.0).unwrap();
    }
    clock.advance(Duration::hours(1));

    thread::scope(|s| {
        for id in &devices {
            let acc = Arc::clone(&acc);
            s.spawn(move || {
                acc.calculate(id, 100.0).unwrap();
            });
        }
        for _ in 0..4 {
            let acc = Arc::clone(&acc);
            let devices = &devices;
            s.spawn(move || {
                for id in devices {
                    let v = acc.get(id).unwrap();
                    assert!(approx(v, 0.0) || approx(v, 100.0), "torn read: {v}");
                }
            });
        }
    });

    for id in &devices {
        assert!(approx(acc.get(id).unwrap(), 100.0));
    }
    assert_eq!(acc.devices().unwrap(), devices);

    let stats = acc.stats();
    assert_eq!(stats.calculations, 16);
    assert_eq!(stats.errors, 0);
}

/// Repeated same-instant calls on one device serialize and never advance.
#[test]
fn test_concurrent_same_device_is_serialized() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let acc = Arc::new(open(dir.path(), &clock));

    acc.calculate("ups-001", 100.0).unwrap();
    clock.advance(Duration::hours(1));

    let results: Vec<f64> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let acc = Arc::clone(&acc);
                s.spawn(move || acc.calculate("ups-001", 100.0).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Exactly one call integrates the hour; the rest see no elapsed time.
    assert!(results.iter().all(|v| approx(*v, 100.0)));
    assert!(approx(acc.get("ups-001").unwrap(), 100.0));
    assert!(approx(acc.store().read("ups-001").unwrap().value, 100.0));
}
