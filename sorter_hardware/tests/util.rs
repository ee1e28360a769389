use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use sorter_hardware::error::HwError;
use sorter_hardware::util::{expand_args, wait_until_low_with_timeout};

#[test]
fn returns_once_line_drops() {
    let high = Arc::new(AtomicBool::new(true));
    let high_bg = high.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        high_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_until_low_with_timeout(
        || high.load(Ordering::Relaxed),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn times_out_when_line_stays_high() {
    let err = wait_until_low_with_timeout(
        || true,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");
    assert!(matches!(err, HwError::DataReadyTimeout), "got {err:?}");
}

#[test]
fn expanded_paths_stay_single_arguments() {
    let tpl = vec!["predict".to_string(), "{image}".to_string()];
    let argv = expand_args(&tpl, &[("image", "/tmp/my images/pi_image_004.jpg")]);
    assert_eq!(argv.len(), 2);
    assert_eq!(argv[1], "/tmp/my images/pi_image_004.jpg");
}

#[cfg(unix)]
#[test]
fn overdue_child_is_killed() {
    use sorter_hardware::util::output_within;
    use std::time::Instant;

    let start = Instant::now();
    let err = output_within("sleep", &["5".to_string()], Duration::from_millis(100))
        .expect_err("sleep 5 must time out");
    assert!(matches!(err, HwError::Command { .. }), "got {err:?}");
    assert!(err.to_string().contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
}

#[cfg(unix)]
#[test]
fn finished_child_output_is_collected() {
    use sorter_hardware::util::output_within;

    let out = output_within("echo", &["hello".to_string()], Duration::from_secs(5))
        .expect("echo runs");
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
}
