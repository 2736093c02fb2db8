// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[yare::parameterized(
    queued   = { "queued", RefreshReason::Queued },
    running  = { "running", RefreshReason::Running },
    subtitle = { "subtitle", RefreshReason::Subtitle },
    shutdown = { "shutdown", RefreshReason::Shutdown },
    padded   = { "  Queued  ", RefreshReason::Queued },
    unknown  = { "mystery", RefreshReason::Update },
)]
fn reasons_parse_from_free_form_strings(raw: &str, expected: RefreshReason) {
    assert_eq!(RefreshReason::parse(raw), expected);
}

#[yare::parameterized(
    queued   = { RefreshReason::Queued, SectionSet::Some(vec![Region::Body]) },
    subtitle = { RefreshReason::Subtitle, SectionSet::Some(vec![Region::HeaderLeft]) },
    power    = { RefreshReason::Power, SectionSet::Some(vec![Region::HeaderRight]) },
    clock    = { RefreshReason::Clock, SectionSet::Some(vec![Region::FooterRight]) },
    theme    = { RefreshReason::Theme, SectionSet::Full },
    initial  = { RefreshReason::Initial, SectionSet::Full },
    shutdown = { RefreshReason::Shutdown, SectionSet::Full },
)]
fn reasons_map_to_default_sections(reason: RefreshReason, expected: SectionSet) {
    assert_eq!(reason.default_sections(), expected);
}

#[test]
fn queue_pops_in_fifo_order() {
    let queue = RefreshQueue::new();
    queue.push(RefreshRequest::new(RefreshReason::Queued));
    queue.push(RefreshRequest::new(RefreshReason::Subtitle));

    assert_eq!(queue.pop(Duration::ZERO).unwrap().reason, RefreshReason::Queued);
    assert_eq!(queue.pop(Duration::ZERO).unwrap().reason, RefreshReason::Subtitle);
    assert!(queue.pop(Duration::ZERO).is_none());
}

#[test]
fn saturated_queue_drops_oldest() {
    let queue = RefreshQueue::new();
    for reason in [
        RefreshReason::Initial,
        RefreshReason::Queued,
        RefreshReason::Running,
        RefreshReason::Completed,
        RefreshReason::Failed,
    ] {
        queue.push(RefreshRequest::new(reason));
    }
    // Sixth push evicts the oldest (Initial)
    queue.push(RefreshRequest::new(RefreshReason::Clock));

    assert_eq!(queue.len(), 5);
    assert_eq!(queue.pop(Duration::ZERO).unwrap().reason, RefreshReason::Queued);
}

#[test]
fn pop_times_out_on_empty_queue() {
    let queue = RefreshQueue::new();
    let start = std::time::Instant::now();
    assert!(queue.pop(Duration::from_millis(50)).is_none());
    assert!(start.elapsed() >= Duration::from_millis(45));
}

#[test]
fn push_wakes_a_blocked_pop() {
    let queue = std::sync::Arc::new(RefreshQueue::new());
    let waiter = {
        let queue = std::sync::Arc::clone(&queue);
        std::thread::spawn(move || queue.pop(Duration::from_secs(5)))
    };
    std::thread::sleep(Duration::from_millis(50));
    queue.push(RefreshRequest::new(RefreshReason::Queued));
    let popped = waiter.join().unwrap();
    assert_eq!(popped.unwrap().reason, RefreshReason::Queued);
}

#[test]
fn explicit_sections_override_defaults() {
    let request =
        RefreshRequest::with_sections(RefreshReason::Queued, vec![Region::FooterRight]);
    assert_eq!(request.sections, SectionSet::Some(vec![Region::FooterRight]));
}
