//! Position mapping between two line-indexed versions of a document.
//!
//! A [`LineMapper`] translates a fractional line position in one version
//! (the "from" side) into the corresponding fractional position in another
//! version (the "to" side).

pub mod diff_mapper;

pub use diff_mapper::{DiffLineMapper, MappingEntry};

/// Bidirectional line position mapping between two line sequences.
pub trait LineMapper: Send + Sync {
    /// Map a fractional line in the "from" space into the "to" space.
    fn map(&self, line: f64) -> f64;
}

/// Mapper between a document and itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLineMapper;

impl LineMapper for IdentityLineMapper {
    fn map(&self, line: f64) -> f64 {
        line
    }
}

/// Split document text into the line sequence used for mapping.
///
/// Lines are trimmed so that indentation or line-ending changes do not break
/// alignment. A text with `n` newline characters has `n + 1` lines, matching
/// how editors count lines.
pub fn normalized_lines(text: &str) -> Vec<String> {
    text.split('\n').map(|l| l.trim().to_string()).collect()
}
