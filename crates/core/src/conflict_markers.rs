//! Locating merge conflict markers in document text.
//!
//! A marker line starts with seven repetitions of `<`, `>`, `|` or `=`.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(<{7}|>{7}|\|{7}|={7})").expect("valid marker regex"))
}

/// Where to look for the next marker relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDirection {
    /// First marker in the document.
    First,
    /// First marker after the cursor line, wrapping to the top.
    Next,
    /// Last marker before the cursor line, wrapping to the bottom.
    Previous,
}

pub fn is_marker_line(line: &str) -> bool {
    marker_regex().is_match(line)
}

/// Whether `text` still contains any conflict marker.
pub fn contains_conflict_markers(text: &str) -> bool {
    text.lines().any(is_marker_line)
}

/// Zero-based line numbers of every marker line.
pub fn marker_lines(text: &str) -> Vec<usize> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| is_marker_line(line))
        .map(|(i, _)| i)
        .collect()
}

/// Find the marker to jump to from `cursor_line`, wrapping circularly.
pub fn find_conflict_marker(text: &str, cursor_line: usize, direction: SearchDirection) -> Option<usize> {
    let markers = marker_lines(text);
    match direction {
        SearchDirection::First => markers.first().copied(),
        SearchDirection::Next => markers
            .iter()
            .copied()
            .find(|&l| l > cursor_line)
            .or_else(|| markers.first().copied()),
        SearchDirection::Previous => markers
            .iter()
            .rev()
            .copied()
            .find(|&l| l < cursor_line)
            .or_else(|| markers.last().copied()),
    }
}
