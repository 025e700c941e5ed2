use serde::{Deserialize, Serialize};

pub const MARKER: char = '*';

/// Immutable description of the request under test.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct RequestModel {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Raw `Cookie` header value.
    pub cookie: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    None,
    Form,
    Json,
    Multipart { boundary: String },
}

impl BodyKind {
    pub fn content_type(&self) -> Option<String> {
        match self {
            BodyKind::None => None,
            BodyKind::Form => Some("application/x-www-form-urlencoded".into()),
            BodyKind::Json => Some("application/json".into()),
            BodyKind::Multipart { boundary } => Some(format!("multipart/form-data; boundary={}", boundary)),
        }
    }
}

impl RequestModel {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Attach a body; a GET request with a body becomes a POST.
    pub fn with_data(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        if self.method.eq_ignore_ascii_case("GET") {
            self.method = "POST".into();
        }
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("cookie") {
            self.cookie = Some(value.into());
        } else {
            self.headers.push((name, value.into()));
        }
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_kind(&self) -> BodyKind {
        let body = match self.body.as_deref() {
            Some(b) if !b.trim().is_empty() => b,
            _ => return BodyKind::None,
        };

        if let Some(ct) = self.header("Content-Type") {
            if ct.to_ascii_lowercase().starts_with("multipart/form-data") {
                if let Some(boundary) = ct.split("boundary=").nth(1) {
                    return BodyKind::Multipart {
                        boundary: boundary.trim_matches('"').trim().to_string(),
                    };
                }
            }
        }
        let trimmed = body.trim_start();
        if trimmed.starts_with("--") {
            if let Some(first) = trimmed.lines().next() {
                let boundary = first.trim_start_matches("--").trim();
                if !boundary.is_empty() && trimmed.contains("Content-Disposition") {
                    return BodyKind::Multipart { boundary: boundary.to_string() };
                }
            }
        }
        let stripped = strip_markers(trimmed);
        if (stripped.starts_with('{') || stripped.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(&stripped).is_ok()
        {
            return BodyKind::Json;
        }
        BodyKind::Form
    }

    pub fn has_custom_markers(&self) -> bool {
        self.url.contains(MARKER)
            || self.cookie.as_deref().is_some_and(|c| c.contains(MARKER))
            || self.body.as_deref().is_some_and(|b| b.contains(MARKER))
            || self.headers.iter().any(|(k, v)| header_may_mark(k) && v.contains(MARKER))
    }

    /// Host component, used to lay out session directories.
    pub fn host(&self) -> String {
        url::Url::parse(&strip_markers(&self.url))
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown-host".to_string())
    }
}

/// `Accept: */*` is too common to treat its stars as markers.
pub fn header_may_mark(name: &str) -> bool {
    !name.eq_ignore_ascii_case("Accept")
}

pub fn strip_markers(value: &str) -> String {
    value.replace(MARKER, "")
}
