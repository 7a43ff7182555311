//! File-system route conventions and request path matching.
//!
//! `app/api/users/[id]/route.ts` serves `/api/users/<anything>`. Route
//! groups like `(admin)` are not part of the URL. Matching starts at the
//! first `api` segment on both sides.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::DYNAMIC_PATH;

const ROUTE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RouteSegment {
    Literal(String),
    /// `[id]`
    Param,
    /// `[...slug]`, or `[[...slug]]` when optional.
    CatchAll { optional: bool },
}

impl RouteSegment {
    fn parse(dir: &str) -> Self {
        if dir.starts_with("[[...") && dir.ends_with("]]") {
            RouteSegment::CatchAll { optional: true }
        } else if dir.starts_with("[...") && dir.ends_with(']') {
            RouteSegment::CatchAll { optional: false }
        } else if dir.starts_with('[') && dir.ends_with(']') {
            RouteSegment::Param
        } else {
            RouteSegment::Literal(dir.to_string())
        }
    }

    fn is_dynamic(&self) -> bool {
        !matches!(self, RouteSegment::Literal(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePattern {
    pub segments: Vec<RouteSegment>,
}

impl RoutePattern {
    /// The URL pattern served by a route file, if `file_path` is one.
    pub fn from_file(file_path: &str) -> Option<Self> {
        let parts: Vec<&str> = file_path.split('/').collect();
        let (file, dirs) = parts.split_last()?;
        let (stem, ext) = file.rsplit_once('.')?;
        if stem != "route" || !ROUTE_EXTENSIONS.contains(&ext) {
            return None;
        }
        let api = dirs.iter().position(|d| *d == "api")?;
        let segments = dirs[api..]
            .iter()
            .filter(|d| !(d.starts_with('(') && d.ends_with(')')))
            .map(|d| RouteSegment::parse(d))
            .collect();
        Some(Self { segments })
    }

    pub fn matches(&self, request: &[String]) -> bool {
        let mut i = 0;
        for (n, segment) in self.segments.iter().enumerate() {
            match segment {
                RouteSegment::Literal(literal) => {
                    if request.get(i) != Some(literal) {
                        return false;
                    }
                    i += 1;
                }
                RouteSegment::Param => {
                    if i >= request.len() {
                        return false;
                    }
                    i += 1;
                }
                RouteSegment::CatchAll { optional } => {
                    let rest = request.len() - i;
                    return n + 1 == self.segments.len() && (rest > 0 || *optional);
                }
            }
        }
        i == request.len()
    }

    pub fn dynamic_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.is_dynamic()).count()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                RouteSegment::Literal(s) => write!(f, "/{s}")?,
                RouteSegment::Param => write!(f, "/[param]")?,
                RouteSegment::CatchAll { optional: false } => write!(f, "/[...rest]")?,
                RouteSegment::CatchAll { optional: true } => write!(f, "/[[...rest]]")?,
            }
        }
        Ok(())
    }
}

pub fn is_route_file(file_path: &str) -> bool {
    RoutePattern::from_file(file_path).is_some()
}

/// Path segments of a request URL from the first `api` segment on.
/// Origin, query string and fragment are dropped.
pub fn request_segments(url: &str) -> Option<Vec<String>> {
    if url == DYNAMIC_PATH {
        return None;
    }
    let without_origin = match url.find("://") {
        Some(scheme) => {
            let rest = &url[scheme + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => url,
    };
    let path = without_origin
        .split(['?', '#'])
        .next()
        .unwrap_or(without_origin);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let api = segments.iter().position(|s| *s == "api")?;
    Some(segments[api..].iter().map(|s| s.to_string()).collect())
}
