// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Branch slug derivation from prompt text.

/// Default word budget for a slug.
pub const SLUG_WORDS: usize = 6;
/// Default character budget for a slug.
pub const SLUG_CHARS: usize = 48;

/// Derive a lowercase hyphenated slug from prompt text.
///
/// Non-alphanumeric runs collapse to single separators, the first
/// `max_words` words are kept, and the result is truncated to `max_chars`
/// with stray hyphens stripped. A vacuous prompt yields `"update"` so the
/// slug is never empty.
pub fn slugify(text: &str, max_words: usize, max_chars: usize) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let kept = if max_words > 0 && words.len() > max_words { &words[..max_words] } else { &words };
    let mut slug = kept.join("-");
    if slug.len() > max_chars {
        slug.truncate(max_chars);
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "update".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
#[path = "slug_tests.rs"]
mod tests;
