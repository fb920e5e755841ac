//! `Prefer` header parsing.
//!
//! Recognized preferences: `return=`, `count=`, `resolution=`, `missing=`,
//! `tx=` and `handling=`. Under `handling=strict` an unknown preference is
//! an error; otherwise it is ignored.

use crate::error::{ApiError, ErrorCode};

/// How much of the affected rows the client wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    #[default]
    Minimal,
    HeadersOnly,
    Representation,
}

/// Counting strategy for `Content-Range` totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

/// Duplicate-key resolution for upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MergeDuplicates,
    IgnoreDuplicates,
}

/// Treatment of columns absent from an insert payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingMode {
    ApplyDefaults,
    ApplyNulls,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub returning: ReturnMode,
    pub count: Option<CountMode>,
    pub resolution: Option<Resolution>,
    pub missing: Option<MissingMode>,
    /// `tx=rollback`: execute, then roll the transaction back.
    pub rollback: bool,
    pub strict: bool,
}

impl Preferences {
    /// Parse one or more `Prefer` header values.
    pub fn parse(headers: &[&str]) -> Result<Self, ApiError> {
        let mut prefs = Preferences::default();
        let mut unknown = Vec::new();
        for header in headers {
            for item in header.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                match item.split_once('=') {
                    Some(("return", "minimal")) => prefs.returning = ReturnMode::Minimal,
                    Some(("return", "headers-only")) => prefs.returning = ReturnMode::HeadersOnly,
                    Some(("return", "representation")) => {
                        prefs.returning = ReturnMode::Representation
                    }
                    Some(("count", "exact")) => prefs.count = Some(CountMode::Exact),
                    Some(("count", "planned")) => prefs.count = Some(CountMode::Planned),
                    Some(("count", "estimated")) => prefs.count = Some(CountMode::Estimated),
                    Some(("resolution", "merge-duplicates")) => {
                        prefs.resolution = Some(Resolution::MergeDuplicates)
                    }
                    Some(("resolution", "ignore-duplicates")) => {
                        prefs.resolution = Some(Resolution::IgnoreDuplicates)
                    }
                    Some(("missing", "default")) => prefs.missing = Some(MissingMode::ApplyDefaults),
                    Some(("missing", "null")) => prefs.missing = Some(MissingMode::ApplyNulls),
                    Some(("tx", "commit")) => prefs.rollback = false,
                    Some(("tx", "rollback")) => prefs.rollback = true,
                    Some(("handling", "strict")) => prefs.strict = true,
                    Some(("handling", "lenient")) => prefs.strict = false,
                    _ => unknown.push(item.to_string()),
                }
            }
        }
        if prefs.strict && !unknown.is_empty() {
            return Err(ApiError::new(
                ErrorCode::MalformedPayload,
                format!("Invalid preferences: {}", unknown.join(", ")),
            ));
        }
        Ok(prefs)
    }
}
