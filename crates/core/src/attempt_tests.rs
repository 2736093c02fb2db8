// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn sample(status: &str) -> AttemptRecord {
    AttemptRecord {
        received_at: "2026-02-01T00:00:00.000Z".into(),
        prompt_text: "Add CHANGELOG entry".into(),
        context: "Project focus: agent-dev-host".into(),
        summary: "Agent run succeeded".into(),
        status: status.into(),
        completed_at: "2026-02-01T00:01:30.000Z".into(),
        duration_seconds: Some(90.25),
        stdout: "applied".into(),
        stderr: String::new(),
    }
}

#[test]
fn write_then_parse_round_trips_one_block() {
    let block = sample("completed");
    let parsed = parse_attempts(&block.render());
    assert_eq!(parsed.len(), 1);
    let got = &parsed[0];
    assert_eq!(got.received_at, block.received_at);
    assert_eq!(got.prompt_text, block.prompt_text);
    assert_eq!(got.context, block.context);
    assert_eq!(got.status, "completed");
    assert_eq!(got.completed_at, block.completed_at);
    assert_eq!(got.duration_seconds, Some(90.25));
    assert_eq!(got.stdout, "applied");
    assert_eq!(got.stderr, "");
    // The display summary derives from the attempt's stdout
    assert_eq!(got.summary, "applied");
}

#[test]
fn summary_derives_from_trailing_stdout_paragraphs() {
    let mut block = sample("completed");
    block.stdout = "first paragraph\n\nsecond paragraph\n\nthird paragraph".into();
    let parsed = parse_attempts(&block.render());
    assert_eq!(parsed[0].summary, "second paragraph\n\nthird paragraph");
}

#[test]
fn summary_falls_back_to_bare_result_line() {
    let mut block = sample("failed");
    block.summary = "Agent failed with exit code 3".into();
    block.stdout = String::new();
    let parsed = parse_attempts(&block.render());
    // No stdout to derive from, so the bare result line is the summary
    assert_eq!(parsed[0].summary, "Agent failed with exit code 3");
    assert_eq!(parsed[0].stdout, "");
}

#[test]
fn k_blocks_parse_to_k_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("prompt_abc.log");
    for status in ["failed", "failed", "completed"] {
        sample(status).append_to(&log_path).unwrap();
    }
    let text = std::fs::read_to_string(&log_path).unwrap();
    let parsed = parse_attempts(&text);
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[0].status, "failed");
    assert_eq!(parsed[2].status, "completed");
}

#[test]
fn empty_log_parses_to_nothing() {
    assert!(parse_attempts("").is_empty());
    assert!(parse_attempts("   \n\n").is_empty());
    assert!(parse_attempts("some unrelated text\n").is_empty());
}

#[test]
fn multiline_prompt_and_context_survive() {
    let mut block = sample("failed");
    block.prompt_text = "line one\nline two\nline three".into();
    block.context = "ctx line\n\nctx paragraph two".into();
    let parsed = parse_attempts(&block.render());
    assert_eq!(parsed[0].prompt_text, block.prompt_text);
    assert_eq!(parsed[0].context, block.context);
}

#[test]
fn placeholders_parse_back_to_empty() {
    let mut block = sample("canceled");
    block.context = String::new();
    block.stdout = String::new();
    block.stderr = String::new();
    let parsed = parse_attempts(&block.render());
    assert_eq!(parsed[0].context, "");
    assert_eq!(parsed[0].stdout, "");
    assert_eq!(parsed[0].stderr, "");
    // The bare result line still surfaces as the summary
    assert_eq!(parsed[0].summary, "Agent run succeeded");
}

#[test]
fn branch_notes_after_a_block_stay_out_of_stderr() {
    let mut text = sample("completed").render();
    text.push_str("\nBranch notes:\nMerged commits: abc123\n\n");
    let parsed = parse_attempts(&text);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].stderr, "");
    assert_eq!(parsed[0].status, "completed");
}

#[test]
fn stdout_summary_takes_trailing_paragraphs() {
    let text = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
    assert_eq!(stdout_summary(text, 2), "second paragraph\n\nthird paragraph");
    assert_eq!(stdout_summary(text, 10), text);
    assert_eq!(stdout_summary("", 2), "");
}

#[test]
fn attempt_status_from_str() {
    assert_eq!("Completed".parse::<AttemptStatus>(), Ok(AttemptStatus::Completed));
    assert_eq!("FAILED".parse::<AttemptStatus>(), Ok(AttemptStatus::Failed));
    assert!("running".parse::<AttemptStatus>().is_err());
}

proptest! {
    #[test]
    fn round_trip_holds_for_plain_text(
        prompt in "[a-zA-Z0-9 ]{1,80}",
        context in "[a-zA-Z0-9 ]{0,80}",
        summary in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,79}",
        stdout in "[a-zA-Z0-9 ]{0,120}",
        seconds in 0.0f64..10_000.0,
    ) {
        let block = AttemptRecord {
            received_at: "2026-02-01T00:00:00.000Z".into(),
            prompt_text: prompt.trim().to_string(),
            context: context.trim().to_string(),
            summary: summary.trim().to_string(),
            status: "completed".into(),
            completed_at: "2026-02-01T00:00:01.000Z".into(),
            duration_seconds: Some((seconds * 1000.0).round() / 1000.0),
            stdout: stdout.trim().to_string(),
            stderr: String::new(),
        };
        let parsed = parse_attempts(&block.render());
        prop_assert_eq!(parsed.len(), 1);
        prop_assert_eq!(&parsed[0].prompt_text, &block.prompt_text);
        prop_assert_eq!(&parsed[0].context, &block.context);
        prop_assert_eq!(&parsed[0].stdout, &block.stdout);
        // Summary: trailing stdout when there is any, else the bare line
        let expected = if block.stdout.is_empty() {
            block.summary.clone()
        } else {
            stdout_summary(&block.stdout, 2)
        };
        prop_assert_eq!(&parsed[0].summary, &expected);
    }
}
