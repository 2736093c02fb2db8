// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attempt-log format: one structured block appended per execution attempt.
//!
//! Each prompt owns an append-only text log. A block opens with
//! `Prompt received at <ts>` and carries the prompt text, the composed
//! context, the attempt status word, timing, the result summary as a bare
//! line, and the captured stdout/stderr. Parsing a log reconstitutes the
//! ordered attempt list for historical views; the per-attempt summary is
//! derived from the trailing stdout paragraphs, falling back to the first
//! bare line after the context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttemptLogError {
    #[error("failed to append attempt block: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome word recorded in an attempt block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Completed,
    Failed,
    Canceled,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "completed" => Ok(AttemptStatus::Completed),
            "failed" => Ok(AttemptStatus::Failed),
            "canceled" => Ok(AttemptStatus::Canceled),
            _ => Err(()),
        }
    }
}

/// One execution attempt, as written to and parsed from the prompt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub received_at: String,
    pub prompt_text: String,
    pub context: String,
    pub summary: String,
    pub status: String,
    pub completed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub stdout: String,
    pub stderr: String,
}

impl AttemptRecord {
    /// Render the block exactly as it appears in the log file. The result
    /// summary is a bare line, not a labeled section.
    pub fn render(&self) -> String {
        let mut sections = vec![
            format!("Prompt received at {}\n---\n{}", self.received_at, self.prompt_text),
            format!(
                "Context provided to the agent:\n{}",
                body_or(&self.context, "<context unavailable>")
            ),
            format!("Attempt status: {}", self.status),
            format!("Attempt completed at {}", self.completed_at),
            format!("Elapsed seconds {:.3}", self.duration_seconds.unwrap_or(0.0)),
        ];
        let summary = self.summary.trim_end();
        if !summary.is_empty() {
            sections.push(summary.to_string());
        }
        sections.push(format!("Agent stdout:\n{}", body_or(&self.stdout, "<no output>")));
        sections.push(format!("Agent stderr:\n{}", body_or(&self.stderr, "<no output>")));
        let mut block = sections.join("\n\n");
        block.push('\n');
        block
    }

    /// Append the block to the prompt's log file, creating parent dirs.
    pub fn append_to(&self, log_path: &Path) -> Result<(), AttemptLogError> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
        file.write_all(self.render().as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

fn body_or<'a>(body: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = body.trim_end();
    if trimmed.is_empty() {
        placeholder
    } else {
        trimmed
    }
}

#[allow(clippy::expect_used)]
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Prompt received at (?P<ts>[^\n]+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)---\n(?P<body>.*?)(?:\n\nContext provided to the agent:|\z)")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)Context provided to the agent:\n(?P<body>.*?)(?:\n\nAttempt status:|\n\nAgent stdout:|\z)",
    )
    .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Attempt status:\s*(?P<status>\w+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static COMPLETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Attempt completed at (?P<ts>[^\n]+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static ELAPSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Elapsed seconds\s+(?P<seconds>[0-9.]+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static STDOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Agent stdout:\n(?P<body>.*?)(?:\n\nAgent stderr:|\z)")
        .expect("constant regex pattern is valid")
});

// Branch-lifecycle notes may follow a block in the same log; the stderr
// capture stops at their label so they never leak into parsed attempts.
#[allow(clippy::expect_used)]
static STDERR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Agent stderr:\n(?P<body>.*?)(?:\n\nBranch notes:|\z)")
        .expect("constant regex pattern is valid")
});

/// Parse a prompt log into its ordered attempt blocks.
///
/// Unrecognized content between headers is skipped rather than failing the
/// whole parse, so a truncated tail (crash mid-append) costs only the last
/// block.
pub fn parse_attempts(log_text: &str) -> Vec<AttemptRecord> {
    let mut attempts = Vec::new();
    if log_text.trim().is_empty() {
        return attempts;
    }
    let headers: Vec<_> = HEADER_RE.find_iter(log_text).collect();
    for (idx, m) in headers.iter().enumerate() {
        let end = headers.get(idx + 1).map(|next| next.start()).unwrap_or(log_text.len());
        let chunk = log_text[m.start()..end].trim();
        if let Some(parsed) = parse_chunk(chunk) {
            attempts.push(parsed);
        }
    }
    attempts
}

fn parse_chunk(chunk: &str) -> Option<AttemptRecord> {
    let header = HEADER_RE.captures(chunk)?;
    let received_at = header.name("ts")?.as_str().trim().to_string();

    let section = |re: &Regex| {
        re.captures(chunk)
            .and_then(|c| c.name("body"))
            .map(|m| unplaceholder(m.as_str().trim()))
            .unwrap_or_default()
    };

    let context_end = CONTEXT_RE
        .captures(chunk)
        .and_then(|c| c.name("body"))
        .map(|m| m.end())
        .unwrap_or_else(|| header.get(0).map(|m| m.end()).unwrap_or(0));
    let stdout = section(&STDOUT_RE);
    let mut summary = stdout_summary(&stdout, SUMMARY_PARAGRAPHS);
    if summary.is_empty() {
        summary = metadata_summary(chunk, context_end);
    }

    Some(AttemptRecord {
        received_at,
        prompt_text: PROMPT_RE
            .captures(chunk)
            .and_then(|c| c.name("body"))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        context: section(&CONTEXT_RE),
        summary,
        status: STATUS_RE
            .captures(chunk)
            .and_then(|c| c.name("status"))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default(),
        completed_at: COMPLETED_RE
            .captures(chunk)
            .and_then(|c| c.name("ts"))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        duration_seconds: ELAPSED_RE
            .captures(chunk)
            .and_then(|c| c.name("seconds"))
            .and_then(|m| m.as_str().parse().ok()),
        stdout,
        stderr: section(&STDERR_RE),
    })
}

/// Fallback summary when an attempt produced no stdout: the first bare
/// line after the context that is neither a field label nor a placeholder.
fn metadata_summary(chunk: &str, context_end: usize) -> String {
    const LABELS: [&str; 6] = [
        "Attempt status:",
        "Attempt completed at",
        "Elapsed seconds",
        "Agent stdout:",
        "Agent stderr:",
        "Branch notes:",
    ];
    chunk[context_end.min(chunk.len())..]
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('<')
                && !LABELS.iter().any(|label| line.starts_with(label))
        })
        .map(str::to_string)
        .unwrap_or_default()
}

fn unplaceholder(body: &str) -> String {
    match body {
        "<no output>" | "<context unavailable>" => String::new(),
        other => other.to_string(),
    }
}

/// Paragraphs of stdout kept for derived summaries.
pub const SUMMARY_PARAGRAPHS: usize = 2;

/// Trailing paragraphs of an attempt's stdout, used as a display summary.
pub fn stdout_summary(stdout_text: &str, paragraph_count: usize) -> String {
    let trimmed = stdout_text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let paragraphs: Vec<&str> = trimmed
        .split("\n\n")
        .map(|block| block.trim_matches(['\r', '\n']))
        .filter(|block| !block.trim().is_empty())
        .collect();
    if paragraphs.is_empty() {
        return String::new();
    }
    let start = paragraphs.len().saturating_sub(paragraph_count.max(1));
    paragraphs[start..].join("\n\n")
}

#[cfg(test)]
#[path = "attempt_tests.rs"]
mod tests;
