//! Drives `ScaleMonitor::run` with a scripted scale and a manual clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorter_core::mocks::{ManualClock, ScriptedWeightSource};
use sorter_core::{
    CancelToken, EventDispatcher, MonitorCfg, ScaleMonitor, SemanticEvent, ShutdownFlag,
    SorterError,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Dispatcher that records `(event, reads so far)`.
fn recording_dispatcher(
    reads: sorter_core::mocks::ScaleCounters,
) -> (EventDispatcher, Arc<Mutex<Vec<(SemanticEvent, usize)>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut d = EventDispatcher::new(ShutdownFlag::new());
    for event in SemanticEvent::ALL {
        let (log, reads) = (log.clone(), reads.clone());
        d.register(event, move || {
            log.lock().unwrap().push((event, reads.reads()));
            Ok(())
        });
    }
    (d, log)
}

#[test]
fn place_settle_remove_at_expected_positions() {
    let clock = ManualClock::new();
    let cancel = CancelToken::new();
    let source = ScriptedWeightSource::timed(
        [
            (ms(0), 0.0),
            (ms(0), 0.0),
            (ms(0), 10.0),
            (ms(0), 10.0),
            (ms(1200), 10.0),
            (ms(0), 10.0),
            (ms(0), 0.0),
        ],
        clock.clone(),
    )
    .cancel_when_done(cancel.clone());
    let counters = source.counters();
    let monitor = ScaleMonitor::new(Box::new(source), MonitorCfg::default(), Arc::new(clock));
    let (dispatcher, log) = recording_dispatcher(counters.clone());

    monitor.run(&dispatcher, &cancel).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (SemanticEvent::ItemPlaced, 3),
            (SemanticEvent::ItemSettled, 5),
            (SemanticEvent::ItemRemoved, 7),
        ]
    );
    // Entry, after removal, exit.
    assert_eq!(counters.zeros(), 3);
}

#[test]
fn settle_needs_the_full_window() {
    let clock = ManualClock::new();
    let cancel = CancelToken::new();
    let source = ScriptedWeightSource::timed(
        [
            (ms(0), 0.0),
            (ms(0), 25.0),
            (ms(400), 25.0),
            (ms(400), 25.0),
            (ms(199), 25.0),
        ],
        clock.clone(),
    )
    .cancel_when_done(cancel.clone());
    let counters = source.counters();
    let monitor = ScaleMonitor::new(Box::new(source), MonitorCfg::default(), Arc::new(clock));
    let (dispatcher, log) = recording_dispatcher(counters);

    monitor.run(&dispatcher, &cancel).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![(SemanticEvent::ItemPlaced, 2)]
    );
}

#[test]
fn read_failure_ends_the_loop_with_sensor_error() {
    let source = ScriptedWeightSource::new([0.0, 0.0]);
    let counters = source.counters();
    let monitor = ScaleMonitor::new(
        Box::new(source),
        MonitorCfg::default(),
        Arc::new(ManualClock::new()),
    );
    let (dispatcher, log) = recording_dispatcher(counters.clone());
    let err = monitor.run(&dispatcher, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, SorterError::Sensor(_)));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(counters.reads(), 3);
}

#[test]
fn cancelled_before_start_reads_once_at_most() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let source = ScriptedWeightSource::new([0.0]).hold_last();
    let counters = source.counters();
    let monitor = ScaleMonitor::new(
        Box::new(source),
        MonitorCfg::default(),
        Arc::new(ManualClock::new()),
    );
    let (dispatcher, _log) = recording_dispatcher(counters.clone());
    monitor.run(&dispatcher, &cancel).unwrap();
    assert_eq!(counters.reads(), 0);
    assert_eq!(counters.zeros(), 2);
}

#[test]
fn poll_interval_paces_reads() {
    let clock = ManualClock::new();
    let cancel = CancelToken::new();
    let source = ScriptedWeightSource::new([0.0, 0.0, 0.0]).cancel_when_done(cancel.clone());
    let counters = source.counters();
    let cfg = MonitorCfg {
        poll_interval: ms(50),
        ..MonitorCfg::default()
    };
    let monitor = ScaleMonitor::new(Box::new(source), cfg, Arc::new(clock.clone()));
    let (dispatcher, _log) = recording_dispatcher(counters);
    monitor.run(&dispatcher, &cancel).unwrap();
    assert_eq!(clock.elapsed(), ms(150));
}
