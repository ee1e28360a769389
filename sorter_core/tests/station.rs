//! End-to-end cycles through a fully wired `Station`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sorter_core::mocks::{
    CountingCamera, FixedClassifier, LightCall, RecordingLights, ScriptedWeightSource,
};
use sorter_core::{
    Animation, CycleOutcome, MonitorCfg, Pattern, ShutdownReport, SorterError, Station,
    StopOutcome, TaskKind, TeardownCfg, WasteCategory, WorkflowCfg,
};
use sorter_traits::{LightChannel, LightColor};

fn fast_monitor(settle_ms: u64) -> MonitorCfg {
    MonitorCfg {
        place_threshold_g: 4.0,
        settle: Duration::from_millis(settle_ms),
        poll_interval: Duration::ZERO,
    }
}

fn fast_workflow() -> WorkflowCfg {
    WorkflowCfg {
        processing: Animation {
            pattern: Pattern::Wave,
            interval: Duration::from_millis(2),
        },
        indication: Duration::from_millis(10),
        release_after_capture: true,
    }
}

/// Empty platform, then a 50 g item that stays.
fn item_source() -> ScriptedWeightSource {
    ScriptedWeightSource::new([0.0, 0.0, 50.0])
        .hold_last()
        .with_read_delay(Duration::from_millis(2))
}

#[test]
fn plastic_cycle_ends_on_blue() {
    let lights = Arc::new(RecordingLights::new());
    let camera = CountingCamera::new();
    let cam = camera.counters();
    let station = Station::builder()
        .with_scale(item_source())
        .with_shared_lights(lights.clone())
        .with_camera(camera)
        .with_classifier(FixedClassifier::returning("plastic"))
        .with_monitor(fast_monitor(30))
        .with_workflow(fast_workflow())
        .build()
        .unwrap();

    let outcome = station.run_cycle().unwrap().expect("cycle should complete");
    let CycleOutcome::Classified(c) = outcome else {
        panic!("expected classification, got {outcome:?}");
    };
    assert_eq!(c.prediction.label, "plastic");
    assert_eq!(c.category, WasteCategory::Recycling);
    assert_eq!(
        lights.last(),
        Some(LightCall::On(LightChannel::Color(LightColor::Blue)))
    );
    assert_eq!(cam.captures(), 1);
    assert_eq!(cam.releases(), 1);

    assert!(matches!(station.shutdown(), ShutdownReport::Completed { .. }));
    assert!(!station.supervisor().is_running(TaskKind::ScaleListening));
}

#[test]
fn initialize_tares_and_shows_ready() {
    let lights = Arc::new(RecordingLights::new());
    let source = ScriptedWeightSource::new([]);
    let counters = source.counters();
    let station = Station::builder()
        .with_scale(source)
        .with_shared_lights(lights.clone())
        .with_camera(CountingCamera::new())
        .with_classifier(FixedClassifier::returning("glass"))
        .with_workflow(fast_workflow())
        .build()
        .unwrap();
    station.initialize().unwrap();
    assert_eq!(counters.zeros(), 1);
    assert_eq!(lights.last(), Some(LightCall::On(LightChannel::All)));
    assert!(!station.supervisor().is_running(TaskKind::LightAnimation));
}

#[test]
fn shutdown_while_item_placed_aborts_cleanly() {
    let camera = CountingCamera::new();
    let cam = camera.counters();
    let station = Arc::new(
        Station::builder()
            .with_scale(item_source())
            .with_lights(RecordingLights::new())
            .with_camera(camera)
            .with_classifier(FixedClassifier::returning("glass"))
            .with_monitor(fast_monitor(60_000))
            .with_workflow(fast_workflow())
            .build()
            .unwrap(),
    );

    let s = station.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        s.shutdown()
    });
    assert_eq!(station.run_cycle().unwrap(), None);
    assert!(matches!(
        stopper.join().unwrap(),
        ShutdownReport::Completed { .. }
    ));
    assert_eq!(cam.captures(), 0);
    assert_eq!(cam.releases(), 1);
    assert!(!station.supervisor().is_running(TaskKind::ScaleListening));
    // No new cycles once shutting down.
    assert_eq!(station.run_cycle().unwrap(), None);
}

#[test]
fn concurrent_shutdown_releases_camera_once() {
    let camera = CountingCamera::new();
    let cam = camera.counters();
    let station = Station::builder()
        .with_scale(item_source())
        .with_lights(RecordingLights::new())
        .with_camera(camera)
        .with_classifier(FixedClassifier::returning("glass"))
        .with_monitor(fast_monitor(60_000))
        .build()
        .unwrap();
    station.arm().unwrap();
    thread::sleep(Duration::from_millis(20));

    let coord = station.coordinator();
    let (a, b) = (coord.clone(), coord.clone());
    let ta = thread::spawn(move || a.shutdown());
    let tb = thread::spawn(move || b.shutdown());
    let reports = [ta.join().unwrap(), tb.join().unwrap()];
    assert_eq!(
        reports
            .iter()
            .filter(|r| **r == ShutdownReport::AlreadyRequested)
            .count(),
        1
    );
    assert_eq!(cam.releases(), 1);
}

fn eventually(what: &str, timeout: Duration, mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !pred() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn shutdown_during_slow_capture_is_bounded() {
    let camera = CountingCamera::new().with_capture_delay(Duration::from_secs(2));
    let cam = camera.counters();
    let station = Station::builder()
        .with_scale(item_source())
        .with_lights(RecordingLights::new())
        .with_camera(camera)
        .with_classifier(FixedClassifier::returning("glass"))
        .with_monitor(fast_monitor(20))
        .with_workflow(fast_workflow())
        .with_teardown(TeardownCfg {
            join_timeout: Duration::from_millis(200),
        })
        .build()
        .unwrap();
    station.arm().unwrap();
    eventually("capture to start", Duration::from_secs(3), || cam.captures() == 1);

    let start = Instant::now();
    let report = station.shutdown();
    let took = start.elapsed();
    assert!(took < Duration::from_millis(1500), "shutdown took {took:?}");
    assert!(matches!(
        report,
        ShutdownReport::Completed {
            scale: StopOutcome::TimedOut,
            ..
        }
    ));

    // The cycle that still holds the camera releases it once the capture returns.
    eventually("camera release", Duration::from_secs(5), || cam.releases() == 1);
    assert_eq!(cam.captures(), 1);
}

#[test]
fn sensor_failure_completes_the_cycle() {
    let station = Station::builder()
        .with_scale(ScriptedWeightSource::new([0.0, 0.0]))
        .with_lights(RecordingLights::new())
        .with_camera(CountingCamera::new())
        .with_classifier(FixedClassifier::returning("glass"))
        .build()
        .unwrap();
    let outcome = station.run_cycle().unwrap().expect("failure still completes");
    assert!(matches!(outcome, CycleOutcome::Failed(SorterError::Sensor(_))));
}

#[test]
fn second_cycle_waits_for_a_new_item() {
    let station = Station::builder()
        .with_scale(item_source())
        .with_lights(RecordingLights::new())
        .with_camera(CountingCamera::new())
        .with_classifier(FixedClassifier::returning("paper"))
        .with_monitor(fast_monitor(20))
        .with_workflow(fast_workflow())
        .build()
        .unwrap();
    let first = station.run_cycle().unwrap().unwrap();
    assert!(first.is_classified());

    // The item is still on the platform; the re-armed listener primes on it
    // and sees no new placement.
    station.arm().unwrap();
    assert_eq!(
        station.wait_for_cycle_timeout(Duration::from_millis(100)),
        None
    );
    station.shutdown();
}
