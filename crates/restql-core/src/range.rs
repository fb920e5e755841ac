//! `Range` request header and `Content-Range` response header.
//!
//! Row ranges use the `items` unit implicitly: `Range: 0-9` means the first
//! ten rows. `Content-Range` reports `<first>-<last>/<total|*>`, or
//! `*/<total|*>` for an empty window.

use crate::error::{ApiError, ErrorCode};
use std::fmt;

/// A half-open row window requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRange {
    pub offset: u64,
    /// `None` means "to the end".
    pub limit: Option<u64>,
}

impl RequestRange {
    /// Parse a `Range` header value like `0-9` or `5-`.
    pub fn parse(header: &str) -> Result<Self, ApiError> {
        let header = header.trim();
        let header = header.strip_prefix("items=").unwrap_or(header);
        let (first, last) = header.split_once('-').ok_or_else(|| {
            ApiError::new(ErrorCode::ParseError, format!("invalid range: \"{header}\""))
        })?;
        let offset: u64 = first.trim().parse().map_err(|_| {
            ApiError::new(ErrorCode::ParseError, format!("invalid range: \"{header}\""))
        })?;
        let limit = match last.trim() {
            "" => None,
            s => {
                let end: u64 = s.parse().map_err(|_| {
                    ApiError::new(ErrorCode::ParseError, format!("invalid range: \"{header}\""))
                })?;
                if end < offset {
                    return Err(ApiError::new(
                        ErrorCode::ParseError,
                        format!("invalid range: \"{header}\""),
                    ));
                }
                Some(end - offset + 1)
            }
        };
        Ok(RequestRange { offset, limit })
    }
}

/// The `Content-Range` value reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    /// Number of rows in the window; zero renders the `*/total` form.
    pub rows: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn new(first: u64, rows: u64, total: Option<u64>) -> Self {
        Self { first, rows, total }
    }

    /// Whether the response should be 206 Partial Content instead of 200.
    pub fn is_partial(&self) -> bool {
        match self.total {
            Some(total) => self.rows > 0 && (self.first > 0 || self.first + self.rows < total),
            None => false,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows == 0 {
            write!(f, "*/")?;
        } else {
            write!(f, "{}-{}/", self.first, self.first + self.rows - 1)?;
        }
        match self.total {
            Some(total) => write!(f, "{total}"),
            None => write!(f, "*"),
        }
    }
}
