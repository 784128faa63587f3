//! Diff-based approximate line mapping.
//!
//! The two line sequences are aligned with a Myers diff. Every boundary of a
//! common run becomes a [`MappingEntry`]; queries interpolate between the
//! surrounding entries, so positions inside changed blocks are spread
//! linearly across the corresponding block on the other side.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};
use tracing::trace;

use super::{normalized_lines, LineMapper};

/// A point of correspondence between the two sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub old_line: usize,
    pub new_line: usize,
}

/// Monotonic mapping between an "old" and a "new" line sequence.
///
/// The table always starts at `(0, 0)` and ends at `(old_len, new_len)`, and
/// is non-decreasing in both coordinates. Cloning and reversing share the
/// table.
#[derive(Debug, Clone)]
pub struct DiffLineMapper {
    mapping: Arc<[MappingEntry]>,
    reversed: bool,
}

impl DiffLineMapper {
    /// Align `old` against `new` after trimming every line.
    pub fn new<S: AsRef<str>>(old: &[S], new: &[S]) -> Self {
        let old: Vec<&str> = old.iter().map(|l| l.as_ref().trim()).collect();
        let new: Vec<&str> = new.iter().map(|l| l.as_ref().trim()).collect();
        let mapping = build_mapping(&old, &new);
        trace!(
            old_lines = old.len(),
            new_lines = new.len(),
            entries = mapping.len(),
            "built line mapping"
        );
        Self {
            mapping: mapping.into(),
            reversed: false,
        }
    }

    /// Convenience constructor from whole document texts.
    pub fn from_texts(old: &str, new: &str) -> Self {
        Self::new(&normalized_lines(old), &normalized_lines(new))
    }

    /// A mapper over the same table with the two sides swapped.
    pub fn create_reversed(&self) -> Self {
        Self {
            mapping: Arc::clone(&self.mapping),
            reversed: !self.reversed,
        }
    }

    /// The mapping table in `(old, new)` orientation.
    pub fn entries(&self) -> &[MappingEntry] {
        &self.mapping
    }

    fn from_at(&self, index: usize) -> f64 {
        let entry = self.mapping[index];
        if self.reversed {
            entry.new_line as f64
        } else {
            entry.old_line as f64
        }
    }

    fn to_at(&self, index: usize) -> f64 {
        let entry = self.mapping[index];
        if self.reversed {
            entry.old_line as f64
        } else {
            entry.new_line as f64
        }
    }

    /// Resolve an exact hit on a "from" coordinate: widen to the maximal run
    /// of entries sharing that coordinate and return the middle of the "to"
    /// interval they span.
    fn tie_value(&self, index: usize) -> f64 {
        let value = self.from_at(index);
        let mut start = index;
        while start > 0 && self.from_at(start - 1) == value {
            start -= 1;
        }
        let mut end = index;
        while end + 1 < self.mapping.len() && self.from_at(end + 1) == value {
            end += 1;
        }
        (self.to_at(start) + self.to_at(end)) / 2.0
    }
}

impl LineMapper for DiffLineMapper {
    fn map(&self, line: f64) -> f64 {
        let last = self.mapping.len() - 1;
        if line.is_nan() || line < 0.0 {
            return 0.0;
        }
        if line > self.from_at(last) {
            return self.to_at(last);
        }

        // Interpolation search over the monotonic table. Invariant after the
        // equality checks: from(lo) < line < from(hi).
        let mut lo = 0;
        let mut hi = last;
        loop {
            let lo_from = self.from_at(lo);
            if lo_from == line {
                return self.tie_value(lo);
            }
            let hi_from = self.from_at(hi);
            if hi_from == line {
                return self.tie_value(hi);
            }

            if hi - lo <= 1 {
                let lo_to = self.to_at(lo);
                let hi_to = self.to_at(hi);
                let fraction = (line - lo_from) / (hi_from - lo_from);
                return (lo_to + fraction * (hi_to - lo_to)).clamp(lo_to, hi_to);
            }

            let estimate = lo as f64 + (line - lo_from) / (hi_from - lo_from) * (hi - lo) as f64;
            let mid = (estimate.floor() as usize).clamp(lo + 1, hi - 1);
            let mid_from = self.from_at(mid);
            if mid_from < line {
                lo = mid;
            } else if mid_from > line {
                hi = mid;
            } else {
                return self.tie_value(mid);
            }
        }
    }
}

/// Walk the aligned runs and record the boundaries of every common run.
///
/// Changed lines between two common runs (removed, added, or both) are
/// treated as one block so their positions interpolate across it.
fn build_mapping(old: &[&str], new: &[&str]) -> Vec<MappingEntry> {
    let mut entries = vec![MappingEntry {
        old_line: 0,
        new_line: 0,
    }];

    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            push_entry(&mut entries, old_range.start, new_range.start);
            push_entry(&mut entries, old_range.end, new_range.end);
        }
    }

    push_entry(&mut entries, old.len(), new.len());
    entries
}

fn push_entry(entries: &mut Vec<MappingEntry>, old_line: usize, new_line: usize) {
    let entry = MappingEntry { old_line, new_line };
    if entries.last() != Some(&entry) {
        entries.push(entry);
    }
}
