// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_window_reports_zeroes() {
    let window = DurationWindow::new(50);
    let report = window.report();
    assert_eq!(report.window, 50);
    assert_eq!(report.samples, 0);
    assert_eq!(report.wait, DurationSummary::default());
    assert_eq!(report.run, DurationSummary::default());
}

#[test]
fn report_averages_non_null_values() {
    let mut window = DurationWindow::new(50);
    window.push(Some(2.0), Some(10.0));
    window.push(Some(4.0), None);
    window.push(None, Some(30.0));

    let report = window.report();
    assert_eq!(report.samples, 3);
    assert_eq!(report.wait.count, 2);
    assert_eq!(report.wait.avg, 3.0);
    assert_eq!(report.wait.max, 4.0);
    assert_eq!(report.run.count, 2);
    assert_eq!(report.run.avg, 20.0);
    assert_eq!(report.run.max, 30.0);
}

#[test]
fn window_drops_oldest_sample() {
    let mut window = DurationWindow::new(3);
    for i in 1..=5 {
        window.push(Some(i as f64), None);
    }
    assert_eq!(window.len(), 3);
    let report = window.report();
    // Samples 1 and 2 fell off the front
    assert_eq!(report.wait.avg, 4.0);
    assert_eq!(report.wait.max, 5.0);
}

#[test]
fn zero_window_is_clamped_to_one() {
    let mut window = DurationWindow::new(0);
    window.push(Some(1.0), None);
    window.push(Some(2.0), None);
    assert_eq!(window.len(), 1);
}
