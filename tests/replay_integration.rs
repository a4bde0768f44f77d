use capture_replay::record::encode_record;
use capture_replay::{PayloadType, ReplayConfig, ReplayEngine, ReplayError, StopReason};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

const MS: i64 = 1_000_000;

fn capture_bytes(records: &[(char, &str, i64)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (tag, id, ts) in records {
        let payload = format!("{tag} {id} {ts}\r\nGET /{id} HTTP/1.1\r\nHost: example.test\r\n\r\n");
        encode_record(&mut buf, payload.as_bytes()).unwrap();
    }
    buf
}

fn write_capture(path: &Path, records: &[(char, &str, i64)]) {
    let buf = capture_bytes(records);
    if path.extension().is_some_and(|e| e == "gz") {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(&buf).unwrap();
        enc.finish().unwrap();
    } else {
        std::fs::write(path, buf).unwrap();
    }
}

fn pattern(dir: &Path, glob: &str) -> String {
    format!("{}/{}", dir.display(), glob)
}

fn read_all(engine: &ReplayEngine) -> Vec<(PayloadType, String, i64)> {
    engine
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r.kind(), r.meta().id.clone(), r.timestamp())
        })
        .collect()
}

#[test]
fn merges_sources_in_timestamp_order() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "a1", 10), ('1', "a2", 40), ('1', "a3", 70)]);
    write_capture(&dir.path().join("b.log"), &[('1', "b1", 20), ('3', "b2", 50)]);
    write_capture(&dir.path().join("c.log"), &[('1', "c1", 5), ('1', "c2", 60), ('1', "c3", 80)]);

    let mut engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();
    let out = read_all(&engine);

    let ids: Vec<&str> = out.iter().map(|(_, id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "a1", "b1", "a2", "b2", "c2", "a3", "c3"]);
    assert!(out.windows(2).all(|w| w[0].2 <= w[1].2));

    // Completion is sticky and nothing more is delivered.
    assert!(engine.read().unwrap().is_none());
    let summary = engine.wait().unwrap();
    assert_eq!(summary.emitted, 8);
    assert_eq!(summary.reason, StopReason::Exhausted);
    assert_eq!(summary.open_sources, 0);
}

#[test]
fn responses_jump_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "r1", 10), ('1', "r2", 20), ('1', "r3", 30)]);
    write_capture(&dir.path().join("b.log"), &[('2', "late", 1_000)]);

    let engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();
    let out = read_all(&engine);
    assert_eq!(out[0], (PayloadType::Response, "late".to_string(), 1_000));
    assert_eq!(out.len(), 4);
}

#[test]
fn response_priority_and_delay_baseline_scenario() {
    // A: request@100ms, request@300ms. B: response@200ms.
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "a", 100 * MS), ('1', "a", 300 * MS)]);
    write_capture(&dir.path().join("b.log"), &[('2', "b", 200 * MS)]);

    let engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();

    let t0 = Instant::now();
    let first = engine.read().unwrap().unwrap();
    let t1 = Instant::now();
    let second = engine.read().unwrap().unwrap();
    let t2 = Instant::now();
    let third = engine.read().unwrap().unwrap();
    let t3 = Instant::now();
    assert!(engine.read().unwrap().is_none());

    assert_eq!((first.kind(), first.timestamp()), (PayloadType::Response, 200 * MS));
    assert_eq!((second.kind(), second.timestamp()), (PayloadType::Request, 100 * MS));
    assert_eq!((third.kind(), third.timestamp()), (PayloadType::Request, 300 * MS));

    // B moves the baseline to 200ms, so A@100 is behind it and goes out at once.
    assert!(t1 - t0 < Duration::from_millis(80), "{:?}", t1 - t0);
    assert!(t2 - t1 < Duration::from_millis(80), "{:?}", t2 - t1);
    // A@300 waits out the 200ms gap from A@100.
    assert!(t3 - t2 >= Duration::from_millis(180), "{:?}", t3 - t2);
}

#[test]
fn speed_factor_scales_observed_gaps() {
    let gap = |speed: f64| {
        let dir = tempfile::tempdir().unwrap();
        write_capture(&dir.path().join("a.log"), &[('1', "x", 0), ('1', "y", 200 * MS)]);
        let cfg = ReplayConfig::default().with_speed_factor(speed);
        let engine = ReplayEngine::start(pattern(dir.path(), "*.log"), cfg).unwrap();
        engine.read().unwrap().unwrap();
        let start = Instant::now();
        engine.read().unwrap().unwrap();
        start.elapsed()
    };

    let normal = gap(1.0);
    let double = gap(2.0);
    assert!(normal >= Duration::from_millis(180), "{normal:?}");
    assert!(double >= Duration::from_millis(90), "{double:?}");
    assert!(double < Duration::from_millis(190), "{double:?}");
}

#[test]
fn loop_restarts_from_the_pattern() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "a1", 1), ('1', "a2", 2)]);
    write_capture(&dir.path().join("b.log.gz"), &[('1', "b1", 3)]);

    let cfg = ReplayConfig::default().with_looping(true);
    let mut engine = ReplayEngine::start(pattern(dir.path(), "*"), cfg).unwrap();
    let ids: Vec<String> = (0..7).map(|_| engine.read().unwrap().unwrap().meta().id.clone()).collect();
    assert_eq!(ids, vec!["a1", "a2", "b1", "a1", "a2", "b1", "a1"]);

    engine.stop();
    let summary = engine.wait().unwrap();
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(summary.restarts >= 2);
    assert_eq!(summary.open_sources, 0);
}

#[test]
fn loop_restart_resets_request_timing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log");
    write_capture(&path, &[('1', "first", 0)]);

    let cfg = ReplayConfig::default().with_looping(true);
    let engine = ReplayEngine::start(pattern(dir.path(), "*.log"), cfg).unwrap();

    // Swap in a capture recorded 5s later; the open handle keeps the old file.
    let staged = dir.path().join("staged.tmp");
    write_capture(&staged, &[('1', "second", 5_000 * MS)]);
    std::fs::rename(&staged, &path).unwrap();

    assert_eq!(engine.read().unwrap().unwrap().meta().id, "first");
    let start = Instant::now();
    let next = engine.read().unwrap().unwrap();
    assert_eq!(next.meta().id, "second");
    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
}

#[test]
fn stop_while_blocked_on_hand_off_releases_sources() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<(char, &str, i64)> = (0..50).map(|i| ('1', "r", i)).collect();
    write_capture(&dir.path().join("a.log"), &records);
    write_capture(&dir.path().join("b.log"), &records);

    let mut engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();
    engine.read().unwrap().unwrap();
    engine.stop();
    let summary = engine.wait().unwrap();

    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.open_sources, 0);
    assert!(engine.read().unwrap().is_none());
}

#[test]
fn stop_interrupts_a_long_delay() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "now", 0), ('1', "later", 60_000 * MS)]);

    let mut engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();
    engine.read().unwrap().unwrap();
    let handle = engine.stop_handle();
    let start = Instant::now();
    handle.stop();
    handle.stop();
    let summary = engine.wait().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(engine.read().unwrap().is_none());
}

#[test]
fn dropping_the_engine_does_not_hang() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("a.log"), &[('1', "a", 1), ('1', "b", 2)]);
    let engine = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).unwrap();
    drop(engine);
}

#[test]
fn multi_member_gzip_replays_every_member() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log.gz");
    let mut file = File::create(&path).unwrap();
    for member in [&[('1', "m1", 10), ('1', "m2", 20)][..], &[('1', "m3", 30)][..]] {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&capture_bytes(member)).unwrap();
        file.write_all(&enc.finish().unwrap()).unwrap();
    }
    drop(file);

    let engine = ReplayEngine::start(pattern(dir.path(), "*.gz"), ReplayConfig::default()).unwrap();
    let ids: Vec<String> = read_all(&engine).into_iter().map(|(_, id, _)| id).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

#[test]
fn empty_pattern_is_an_initialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ReplayEngine::start(pattern(dir.path(), "*.log"), ReplayConfig::default()).err().unwrap();
    assert!(matches!(err, ReplayError::NoMatchingSources(_)));
}

#[test]
fn corrupt_gzip_body_ends_the_session_with_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.log.gz");
    let records: Vec<(char, String, i64)> = (0..200).map(|i| ('1', format!("id{i:04}"), i)).collect();
    let records: Vec<(char, &str, i64)> = records.iter().map(|(t, id, ts)| (*t, id.as_str(), *ts)).collect();
    write_capture(&path, &records);

    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    for b in &mut bytes[mid..mid + 16] {
        *b ^= 0xA5;
    }
    std::fs::write(&path, bytes).unwrap();

    let mut engine = match ReplayEngine::start(pattern(dir.path(), "*.gz"), ReplayConfig::default()) {
        Ok(engine) => engine,
        Err(err) => {
            assert!(matches!(err, ReplayError::Read { .. }), "{err}");
            return;
        }
    };

    let mut delivered = 0;
    let err = loop {
        match engine.read() {
            Ok(Some(_)) => delivered += 1,
            Ok(None) => panic!("corrupt capture replayed without error"),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, ReplayError::Read { .. }), "{err}");
    assert!(delivered < 200);

    let summary = engine.wait().unwrap();
    assert!(matches!(summary.reason, StopReason::Failed(_)));
    assert_eq!(summary.open_sources, 0);
}
