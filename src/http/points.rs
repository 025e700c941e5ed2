use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::request::{header_may_mark, strip_markers, BodyKind, RequestModel, MARKER};
use crate::errors::BlindsightError;

/// Headers tested at level 3 even without a marker.
pub const TESTABLE_HEADERS: [&str; 2] = ["User-Agent", "Referer"];

pub(crate) static MULTIPART_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)content-disposition:\s*form-data;\s*name="([^"]*)""#).expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Location {
    Get,
    Post,
    Cookie,
    Header,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Cookie => "COOKIE",
            Self::Header => "HEADER",
        }
    }

    /// Minimum test level at which this location is probed.
    pub fn level(&self) -> u8 {
        match self {
            Self::Get | Self::Post => 1,
            Self::Cookie => 2,
            Self::Header => 3,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One substitution site in a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct InjectionPoint {
    pub location: Location,
    /// Parameter, cookie or header name. JSON keys use dotted paths, URI
    /// markers are named `#N*`.
    pub name: String,
    /// Value with markers removed.
    pub original_value: String,
    pub is_custom_marker: bool,
}

impl InjectionPoint {
    pub fn describe(&self) -> String {
        format!("{} parameter '{}'", self.location, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredPoints {
    pub points: Vec<InjectionPoint>,
    pub body_kind: BodyKind,
    pub has_custom_markers: bool,
}

impl DiscoveredPoints {
    pub fn at(&self, location: Location) -> impl Iterator<Item = &InjectionPoint> {
        self.points.iter().filter(move |p| p.location == location)
    }

    pub fn custom_locations(&self) -> Vec<Location> {
        let mut out: Vec<Location> = self
            .points
            .iter()
            .filter(|p| p.is_custom_marker)
            .map(|p| p.location)
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// Enumerate every injection point in `request`, in GET, POST, COOKIE, HEADER order.
pub fn discover(request: &RequestModel) -> Result<DiscoveredPoints, BlindsightError> {
    let stripped_url = strip_markers(&request.url);
    url::Url::parse(&stripped_url)
        .map_err(|e| BlindsightError::InvalidTarget(format!("{}: {}", request.url, e)))?;

    let mut points = Vec::new();
    let (path_part, query) = split_url(&request.url);

    for (i, _) in path_part.match_indices(MARKER).enumerate() {
        points.push(InjectionPoint {
            location: Location::Get,
            name: format!("#{}*", i + 1),
            original_value: String::new(),
            is_custom_marker: true,
        });
    }
    if let Some(query) = query {
        points.extend(pairs_to_points(query, '&', Location::Get, true));
    }

    let body_kind = request.body_kind();
    if let Some(body) = request.body.as_deref() {
        match &body_kind {
            BodyKind::None => {}
            BodyKind::Form => points.extend(pairs_to_points(body, '&', Location::Post, true)),
            BodyKind::Json => {
                let value: serde_json::Value = serde_json::from_str(&strip_markers_json(body))?;
                let mut out = Vec::new();
                walk_json(&value, String::new(), &mut out);
                points.extend(out);
            }
            BodyKind::Multipart { boundary } => points.extend(multipart_points(body, boundary)),
        }
    }

    if let Some(cookie) = request.cookie.as_deref() {
        points.extend(pairs_to_points(cookie, ';', Location::Cookie, false));
    }

    for (name, value) in &request.headers {
        let marked = header_may_mark(name) && value.contains(MARKER);
        if marked || TESTABLE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            points.push(InjectionPoint {
                location: Location::Header,
                name: name.clone(),
                original_value: strip_markers(value),
                is_custom_marker: marked,
            });
        }
    }

    let has_custom_markers = points.iter().any(|p| p.is_custom_marker);
    Ok(DiscoveredPoints { points, body_kind, has_custom_markers })
}

pub(crate) fn split_url(url: &str) -> (&str, Option<&str>) {
    let without_fragment = url.split('#').next().unwrap_or(url);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

/// Split `k=v` pieces, keeping raw (still encoded) text.
pub(crate) fn split_pairs(raw: &str, sep: char) -> Vec<(&str, &str)> {
    raw.split(sep)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.split_once('=').unwrap_or((piece, "")))
        .collect()
}

pub(crate) fn decode_component(raw: &str) -> String {
    form_urlencoded::parse(format!("v={}", raw).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

fn pairs_to_points(raw: &str, sep: char, location: Location, decode: bool) -> Vec<InjectionPoint> {
    split_pairs(raw, sep)
        .into_iter()
        .map(|(k, v)| {
            let value = if decode { decode_component(v) } else { v.to_string() };
            InjectionPoint {
                location,
                name: if decode { decode_component(k) } else { k.to_string() },
                original_value: strip_markers(&value),
                is_custom_marker: value.contains(MARKER),
            }
        })
        .collect()
}

/// Unquoted `*` markers (`{"id": 1*}`) make JSON invalid. The marked scalar
/// is quoted (`"1*"`) so the marker survives parsing; stray markers are dropped.
pub(crate) fn strip_markers_json(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut bare_start: Option<usize> = None;
    for c in body.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
        } else if c == '"' {
            in_string = true;
            bare_start = None;
            out.push(c);
        } else if c == MARKER {
            if let Some(start) = bare_start.take() {
                let token = out.split_off(start);
                out.push('"');
                out.push_str(&token);
                out.push(MARKER);
                out.push('"');
            }
        } else {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                bare_start.get_or_insert(out.len());
            } else {
                bare_start = None;
            }
            out.push(c);
        }
    }
    out
}

fn walk_json(value: &serde_json::Value, path: String, out: &mut Vec<InjectionPoint>) {
    use serde_json::Value;
    let join = |key: &str| if path.is_empty() { key.to_string() } else { format!("{}.{}", path, key) };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                walk_json(v, join(k), out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk_json(v, join(&i.to_string()), out);
            }
        }
        leaf => {
            let raw = match leaf {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push(InjectionPoint {
                location: Location::Post,
                name: path,
                original_value: strip_markers(&raw),
                is_custom_marker: raw.contains(MARKER),
            });
        }
    }
}

/// Non-file parts of a multipart body as `(name, value)` pairs.
pub(crate) fn multipart_parts<'a>(body: &'a str, boundary: &str) -> Vec<(String, &'a str)> {
    let delimiter = format!("--{}", boundary);
    body.split(delimiter.as_str())
        .filter_map(|part| {
            let (head, content) = part
                .split_once("\r\n\r\n")
                .or_else(|| part.split_once("\n\n"))?;
            if head.to_ascii_lowercase().contains("filename=") {
                return None;
            }
            let name = MULTIPART_NAME_RE.captures(head)?.get(1)?.as_str().to_string();
            let content = content.strip_suffix("\r\n").or_else(|| content.strip_suffix('\n')).unwrap_or(content);
            Some((name, content))
        })
        .collect()
}

fn multipart_points(body: &str, boundary: &str) -> Vec<InjectionPoint> {
    multipart_parts(body, boundary)
        .into_iter()
        .map(|(name, value)| InjectionPoint {
            location: Location::Post,
            name,
            original_value: strip_markers(value),
            is_custom_marker: value.contains(MARKER),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_points_in_order() {
        let req = RequestModel::get("http://t/item.php?id=1&cat=shoes%20red");
        let found = discover(&req).unwrap();
        let names: Vec<_> = found.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "cat"]);
        assert_eq!(found.points[1].original_value, "shoes red");
        assert!(!found.has_custom_markers);
    }

    #[test]
    fn test_custom_marker_in_query_value() {
        let req = RequestModel::get("http://t/?id=1*&x=2");
        let found = discover(&req).unwrap();
        assert!(found.has_custom_markers);
        assert!(found.points[0].is_custom_marker);
        assert_eq!(found.points[0].original_value, "1");
        assert!(!found.points[1].is_custom_marker);
    }

    #[test]
    fn test_uri_marker_named_by_index() {
        let req = RequestModel::get("http://t/user/5*/profile");
        let found = discover(&req).unwrap();
        assert_eq!(found.points[0].name, "#1*");
        assert_eq!(found.points[0].location, Location::Get);
    }

    #[test]
    fn test_json_points_use_dotted_paths() {
        let req = RequestModel::get("http://t/")
            .with_data(r#"{"user": {"id": 7, "tags": ["a"]}, "q": "x*"}"#);
        let found = discover(&req).unwrap();
        let names: Vec<_> = found.points.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"user.id"));
        assert!(names.contains(&"user.tags.0"));
        let q = found.points.iter().find(|p| p.name == "q").unwrap();
        assert!(q.is_custom_marker);
        assert_eq!(q.original_value, "x");
    }

    #[test]
    fn test_unquoted_json_marker_becomes_custom_point() {
        let req = RequestModel::get("http://t/").with_data(r#"{"id": 12*, "n": 3}"#);
        let found = discover(&req).unwrap();
        let id = found.points.iter().find(|p| p.name == "id").unwrap();
        assert!(id.is_custom_marker);
        assert_eq!(id.original_value, "12");
        assert!(!found.points.iter().find(|p| p.name == "n").unwrap().is_custom_marker);
    }

    #[test]
    fn test_multipart_skips_file_parts() {
        let body = "--B\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\n3\r\n--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\ndata\r\n--B--\r\n";
        let req = RequestModel::get("http://t/").with_data(body);
        let found = discover(&req).unwrap();
        assert_eq!(found.points.len(), 1);
        assert_eq!(found.points[0].name, "id");
        assert_eq!(found.points[0].original_value, "3");
    }

    #[test]
    fn test_cookies_and_headers() {
        let req = RequestModel::get("http://t/")
            .with_cookie("sid=abc; lang=en")
            .with_header("User-Agent", "Mozilla")
            .with_header("X-Api", "k*")
            .with_header("Accept", "*/*x");
        let found = discover(&req).unwrap();
        assert_eq!(found.at(Location::Cookie).count(), 2);
        let headers: Vec<_> = found.at(Location::Header).map(|p| p.name.as_str()).collect();
        assert_eq!(headers, vec!["User-Agent", "X-Api"]);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let req = RequestModel::get("not a url");
        assert!(matches!(discover(&req), Err(BlindsightError::InvalidTarget(_))));
    }
}
