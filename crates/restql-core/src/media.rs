//! Content negotiation for the `Accept` header.
//!
//! Supports quality parameters and wildcard matching; when several types are
//! acceptable the client's quality ordering wins, then specificity.

use crate::error::{ApiError, ErrorCode};

/// Output media types the compiler can shape responses for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    #[default]
    Json,
    /// `application/vnd.pgrst.object+json`, requires exactly one row.
    SingularJson,
    Csv,
    OctetStream,
    TextPlain,
    TextXml,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::SingularJson => "application/vnd.pgrst.object+json",
            MediaType::Csv => "text/csv",
            MediaType::OctetStream => "application/octet-stream",
            MediaType::TextPlain => "text/plain",
            MediaType::TextXml => "text/xml",
        }
    }

    /// Raw output types carry a single column's value through unchanged.
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            MediaType::OctetStream | MediaType::TextPlain | MediaType::TextXml
        )
    }
}

const SUPPORTED: [MediaType; 6] = [
    MediaType::Json,
    MediaType::SingularJson,
    MediaType::Csv,
    MediaType::OctetStream,
    MediaType::TextPlain,
    MediaType::TextXml,
];

#[derive(Debug)]
struct AcceptEntry {
    mime: String,
    quality: f64,
    specificity: u8,
}

fn parse_accept(headers: &[&str]) -> Vec<AcceptEntry> {
    let mut entries = Vec::new();
    for header in headers {
        for part in header.split(',') {
            let mut pieces = part.split(';');
            let mime = match pieces.next() {
                Some(m) => m.trim().to_ascii_lowercase(),
                None => continue,
            };
            if mime.is_empty() {
                continue;
            }
            let mut quality = 1.0;
            for param in pieces {
                if let Some((k, v)) = param.split_once('=')
                    && k.trim() == "q"
                    && let Ok(q) = v.trim().parse::<f64>()
                    && (0.0..=1.0).contains(&q)
                {
                    quality = q;
                }
            }
            // q=0 marks the type as explicitly not acceptable.
            if quality == 0.0 {
                continue;
            }
            let specificity = if mime == "*/*" {
                0
            } else if mime.ends_with("/*") {
                1
            } else {
                2
            };
            entries.push(AcceptEntry {
                mime,
                quality,
                specificity,
            });
        }
    }
    entries.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.specificity.cmp(&a.specificity))
    });
    entries
}

fn matches(pattern: &str, supported: MediaType) -> bool {
    if pattern == supported.as_str() {
        return true;
    }
    if pattern == "*/*" {
        return true;
    }
    if let Some(base) = pattern.strip_suffix("/*") {
        return supported
            .as_str()
            .starts_with(&format!("{base}/"));
    }
    false
}

/// Pick the output media type for the given `Accept` header values.
///
/// An empty or missing header defaults to JSON. Returns
/// [`ErrorCode::NoAcceptableMediaType`] when nothing matches.
pub fn negotiate(accept_headers: &[&str]) -> Result<MediaType, ApiError> {
    if accept_headers.iter().all(|h| h.trim().is_empty()) {
        return Ok(MediaType::Json);
    }
    for entry in parse_accept(accept_headers) {
        for supported in SUPPORTED {
            if matches(&entry.mime, supported) {
                return Ok(supported);
            }
        }
    }
    Err(ApiError::new(
        ErrorCode::NoAcceptableMediaType,
        format!(
            "None of these media types are available: {}",
            accept_headers.join(", ")
        ),
    ))
}
