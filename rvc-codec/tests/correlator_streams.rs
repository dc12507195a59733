//! Status correlator fed from decoded frames

use rvc_codec::{Codec, DecodedRecord, RecordValue, StatusCorrelator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One frame of each stream for driver 1, instance 7
const DRIVER_FRAMES: &[(&str, &str)] = &[
    // output on, current n/a
    ("1FE80", "0107FDFFFFFFFFFF"),
    // fault normal, no short
    ("1FE81", "01F0FFFFFFFFFFFF"),
    // duty 100 %, unlocked, override inactive, forward, 60 s
    ("1FE82", "0107C8F0013CFFFF"),
    // h-bridge, 14.0 V, 25 deg C
    ("1FE83", "010701180141FFFF"),
];

fn decoded(codec: &Codec) -> Vec<DecodedRecord> {
    DRIVER_FRAMES
        .iter()
        .map(|(dgn, data)| codec.decode_hex(dgn, data).unwrap())
        .collect()
}

#[test]
fn test_replay_publishes_once_per_distinct_composite() {
    let codec = Codec::bundled().unwrap();
    let correlator = StatusCorrelator::new();
    let records = decoded(&codec);

    let first_pass: Vec<_> = records
        .iter()
        .filter_map(|record| correlator.update(record).unwrap())
        .collect();
    // output, fault and motor each change the composite; info only repeats the instance
    assert_eq!(first_pass.len(), 3);

    let second_pass = records
        .iter()
        .filter_map(|record| correlator.update(record).unwrap())
        .count();
    assert_eq!(second_pass, 0);

    let last = first_pass.last().unwrap();
    assert_eq!(last.topic, "RVC/WINDOW_SHADE_CONTROL_STATUS/7");
    assert!(last.retain);

    let body = &last.record;
    assert_eq!(body.instance(), Some(7));
    assert_eq!(body.get("motor status"), Some(&RecordValue::Integer(1)));
    assert_eq!(body.get("overcurrent status"), Some(&RecordValue::Integer(0)));
    assert_eq!(body.get("motor duty"), Some(&RecordValue::Float(100.0)));
    assert_eq!(body.get("forward status"), Some(&RecordValue::Integer(1)));
    assert_eq!(body.get("reverse status"), Some(&RecordValue::Integer(0)));
    assert_eq!(body.get("last command"), Some(&RecordValue::Integer(129)));
    assert_eq!(body.definition("last command"), Some("forward"));
    assert_eq!(body.get("duration"), Some(&RecordValue::Integer(60)));
    assert!(body.contains_key("timestamp"));
}

#[test]
fn test_single_record_replayed() {
    let codec = Codec::bundled().unwrap();
    let correlator = StatusCorrelator::new();
    let motor = codec.decode_hex("1FE82", "0107C8F0013CFFFF").unwrap();

    let published = (0..5)
        .filter(|_| correlator.update(&motor).unwrap().is_some())
        .count();
    assert_eq!(published, 1);
}

#[test]
fn test_malformed_update_keeps_other_state() {
    let codec = Codec::bundled().unwrap();
    let correlator = StatusCorrelator::new();
    for record in decoded(&codec) {
        correlator.update(&record).unwrap();
    }

    let mut broken = codec.decode_hex("1FE82", "0107C8F0023CFFFF").unwrap();
    broken.remove("driver_index");
    assert!(correlator.update(&broken).is_err());

    // Baseline untouched: the original motor frame is still "no change"
    let motor = codec.decode_hex("1FE82", "0107C8F0013CFFFF").unwrap();
    assert!(correlator.update(&motor).unwrap().is_none());
    assert_eq!(correlator.len(), 1);
}

#[test]
fn test_concurrent_updates_same_driver() {
    let codec = Codec::bundled().unwrap();
    let correlator = Arc::new(StatusCorrelator::new());
    let motor = Arc::new(codec.decode_hex("1FE82", "0107C8F0013CFFFF").unwrap());
    let published = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let correlator = Arc::clone(&correlator);
            let motor = Arc::clone(&motor);
            let published = Arc::clone(&published);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    if correlator.update(&motor).unwrap().is_some() {
                        published.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(published.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_updates_distinct_drivers() {
    let codec = Arc::new(Codec::bundled().unwrap());
    let correlator = Arc::new(StatusCorrelator::new());

    let handles: Vec<_> = (1..=6u8)
        .map(|driver| {
            let codec = Arc::clone(&codec);
            let correlator = Arc::clone(&correlator);
            std::thread::spawn(move || {
                let data = format!("{:02X}{:02X}C8F0013CFFFF", driver, driver + 10);
                let motor = codec.decode_hex("1FE82", &data).unwrap();
                (0..20)
                    .filter_map(|_| correlator.update(&motor).unwrap())
                    .map(|publication| publication.topic)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut topics: Vec<String> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    topics.sort();

    let expected: Vec<String> = (11..=16)
        .map(|instance| format!("RVC/WINDOW_SHADE_CONTROL_STATUS/{}", instance))
        .collect();
    assert_eq!(topics, expected);
    assert_eq!(correlator.len(), 6);
}
