use serde_json::Value;
use url::form_urlencoded;

use super::points::{split_url, strip_markers_json, Location, InjectionPoint, MULTIPART_NAME_RE};
use super::request::{header_may_mark, strip_markers, BodyKind, RequestModel, MARKER};
use crate::errors::BlindsightError;

/// Placeholder for the payload while the rest of the request is cleaned up.
const SLOT: &str = "__BLINDSIGHT_SLOT__";

/// A fully materialized request ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The unmodified request, with any `*` markers removed.
pub fn baseline(request: &RequestModel) -> PreparedRequest {
    let mut working = request.clone();
    if request.has_custom_markers() {
        strip_all(&mut working);
    }
    finish(working, "")
}

/// Substitute `payload` into `point`. Bodies are rewritten structurally.
pub fn substitute(
    request: &RequestModel,
    point: &InjectionPoint,
    payload: &str,
    encode: bool,
) -> Result<PreparedRequest, BlindsightError> {
    let mut working = request.clone();
    let strip = request.has_custom_markers();

    match point.location {
        Location::Get => {
            let (path, query) = split_url(&working.url);
            let rewritten = if let Some(n) = uri_marker_index(&point.name) {
                let path = replace_nth_marker(path, n).ok_or_else(|| missing(point))?;
                match query {
                    Some(q) => format!("{}?{}", path, q),
                    None => path,
                }
            } else {
                let q = query.ok_or_else(|| missing(point))?;
                let q = rewrite_pairs(q, '&', "&", point, true).ok_or_else(|| missing(point))?;
                format!("{}?{}", path, q)
            };
            working.url = rewritten;
        }
        Location::Post => {
            let body = working.body.clone().ok_or_else(|| missing(point))?;
            working.body = Some(match request.body_kind() {
                BodyKind::Form | BodyKind::None => {
                    rewrite_pairs(&body, '&', "&", point, true).ok_or_else(|| missing(point))?
                }
                BodyKind::Json => rewrite_json(&body, point, strip)?,
                BodyKind::Multipart { boundary } => {
                    rewrite_multipart(&body, &boundary, point).ok_or_else(|| missing(point))?
                }
            });
        }
        Location::Cookie => {
            let cookie = working.cookie.clone().ok_or_else(|| missing(point))?;
            working.cookie = Some(rewrite_pairs(&cookie, ';', "; ", point, false).ok_or_else(|| missing(point))?);
        }
        Location::Header => {
            let header = working
                .headers
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(&point.name))
                .ok_or_else(|| missing(point))?;
            header.1 = if point.is_custom_marker {
                header.1.replacen(MARKER, SLOT, 1)
            } else {
                SLOT.to_string()
            };
        }
    }

    if strip {
        strip_all(&mut working);
    }
    let encoded = encode_for(point, payload, encode, &request.body_kind());
    Ok(finish(working, &encoded))
}

fn missing(point: &InjectionPoint) -> BlindsightError {
    BlindsightError::InvalidTarget(format!("{} not present in request", point.describe()))
}

fn uri_marker_index(name: &str) -> Option<usize> {
    name.strip_prefix('#')?.strip_suffix('*')?.parse().ok()
}

fn replace_nth_marker(value: &str, n: usize) -> Option<String> {
    let (idx, _) = value.match_indices(MARKER).nth(n.checked_sub(1)?)?;
    Some(format!("{}{}{}", &value[..idx], SLOT, &value[idx + MARKER.len_utf8()..]))
}

fn rewrite_pairs(raw: &str, sep: char, joiner: &str, point: &InjectionPoint, decode: bool) -> Option<String> {
    let mut found = false;
    let pieces: Vec<String> = raw
        .split(sep)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
            let name = if decode { super::points::decode_component(key) } else { key.to_string() };
            if found || name != point.name {
                return piece.to_string();
            }
            found = true;
            let value = if point.is_custom_marker {
                value.replacen(MARKER, SLOT, 1)
            } else {
                SLOT.to_string()
            };
            format!("{}={}", key, value)
        })
        .collect();
    found.then(|| pieces.join(joiner))
}

fn rewrite_json(body: &str, point: &InjectionPoint, strip: bool) -> Result<String, BlindsightError> {
    let mut value: Value = serde_json::from_str(&strip_markers_json(body))?;
    if strip {
        strip_json_strings(&mut value, point);
    }
    let target = point
        .name
        .split('.')
        .try_fold(&mut value, |node, key| match node {
            Value::Object(map) => map.get_mut(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        })
        .ok_or_else(|| missing(point))?;
    let replacement = match &*target {
        Value::String(s) if point.is_custom_marker => s.replacen(MARKER, SLOT, 1),
        _ => SLOT.to_string(),
    };
    *target = Value::String(replacement);
    Ok(serde_json::to_string(&value)?)
}

/// Drop markers from every string except the one being injected.
fn strip_json_strings(value: &mut Value, point: &InjectionPoint) {
    fn walk(value: &mut Value, path: &mut Vec<String>, target: &str) {
        match value {
            Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    path.push(k.clone());
                    walk(v, path, target);
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter_mut().enumerate() {
                    path.push(i.to_string());
                    walk(v, path, target);
                    path.pop();
                }
            }
            Value::String(s) if path.join(".") != target => *s = strip_markers(s),
            _ => {}
        }
    }
    walk(value, &mut Vec::new(), &point.name);
}

fn rewrite_multipart(body: &str, boundary: &str, point: &InjectionPoint) -> Option<String> {
    let delimiter = format!("--{}", boundary);
    let mut found = false;
    let parts: Vec<String> = body
        .split(delimiter.as_str())
        .map(|part| {
            if found {
                return part.to_string();
            }
            let split = part.find("\r\n\r\n").map(|i| (i, 4)).or_else(|| part.find("\n\n").map(|i| (i, 2)));
            let Some((idx, sep_len)) = split else { return part.to_string() };
            let head = &part[..idx];
            let is_target = MULTIPART_NAME_RE
                .captures(head)
                .and_then(|c| c.get(1))
                .is_some_and(|m| m.as_str() == point.name)
                && !head.to_ascii_lowercase().contains("filename=");
            if !is_target {
                return part.to_string();
            }
            found = true;
            let content = &part[idx + sep_len..];
            let trailer = if content.ends_with("\r\n") { "\r\n" } else if content.ends_with('\n') { "\n" } else { "" };
            let value = &content[..content.len() - trailer.len()];
            let value = if point.is_custom_marker {
                value.replacen(MARKER, SLOT, 1)
            } else {
                SLOT.to_string()
            };
            format!("{}{}{}", &part[..idx + sep_len], value, trailer)
        })
        .collect();
    found.then(|| parts.join(delimiter.as_str()))
}

fn strip_all(request: &mut RequestModel) {
    request.url = strip_markers(&request.url);
    request.cookie = request.cookie.as_deref().map(strip_markers);
    if request.body_kind() != BodyKind::Json {
        request.body = request.body.as_deref().map(strip_markers);
    } else if let Some(body) = request.body.as_deref() {
        if body.contains(MARKER) {
            if let Ok(mut value) = serde_json::from_str::<Value>(&strip_markers_json(body)) {
                let none = InjectionPoint {
                    location: Location::Post,
                    name: String::new(),
                    original_value: String::new(),
                    is_custom_marker: false,
                };
                strip_json_strings(&mut value, &none);
                request.body = serde_json::to_string(&value).ok().or(Some(strip_markers(body)));
            }
        }
    }
    for (name, value) in request.headers.iter_mut() {
        if header_may_mark(name) {
            *value = strip_markers(value);
        }
    }
}

fn encode_for(point: &InjectionPoint, payload: &str, encode: bool, body_kind: &BodyKind) -> String {
    let form_encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    match point.location {
        Location::Get if uri_marker_index(&point.name).is_some() => {
            if encode { form_encode(payload).replace('+', "%20") } else { payload.to_string() }
        }
        Location::Get | Location::Cookie => {
            if encode { form_encode(payload) } else { payload.to_string() }
        }
        Location::Post => match body_kind {
            BodyKind::Json => {
                let quoted = serde_json::to_string(payload).unwrap_or_default();
                quoted
                    .strip_prefix('"')
                    .and_then(|q| q.strip_suffix('"'))
                    .unwrap_or(&quoted)
                    .to_string()
            }
            BodyKind::Multipart { .. } => payload.to_string(),
            _ => {
                if encode { form_encode(payload) } else { payload.to_string() }
            }
        },
        Location::Header => payload.to_string(),
    }
}

fn finish(request: RequestModel, payload: &str) -> PreparedRequest {
    let fill = |s: &str| s.replace(SLOT, payload);
    let body_kind = request.body_kind();
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), fill(v)))
        .collect();
    if let Some(cookie) = request.cookie.as_deref() {
        headers.push(("Cookie".to_string(), fill(cookie)));
    }
    if request.body.is_some() && request.header("Content-Type").is_none() {
        if let Some(ct) = body_kind.content_type() {
            headers.push(("Content-Type".to_string(), ct));
        }
    }
    PreparedRequest {
        method: request.method.clone(),
        url: fill(&request.url),
        headers,
        body: request.body.as_deref().map(fill),
    }
}
