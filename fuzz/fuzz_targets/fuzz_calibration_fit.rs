#![no_main]
use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sorter_config::{CalibrationRow, ScaleCalibration};

#[derive(Debug, Arbitrary)]
struct Row {
    raw: i64,
    grams: f32,
}

fuzz_target!(|rows: Vec<Row>| {
    let rows: Vec<CalibrationRow> = rows
        .into_iter()
        .map(|r| CalibrationRow {
            raw: r.raw,
            grams: r.grams,
        })
        .collect();
    if let Ok(cal) = ScaleCalibration::from_rows(&rows) {
        assert!(cal.reference_unit.is_finite());
        assert!(cal.reference_unit != 0.0);
    }
});
