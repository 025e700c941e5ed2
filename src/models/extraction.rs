use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::BlindsightError;

/// Ordinal ranges a value's characters are searched over.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// ASCII 32..=126
    #[default]
    Printable,
    Digits,
    Hex,
    Custom(String),
}

impl Charset {
    /// Sorted, de-duplicated ordinals.
    pub fn ordinals(&self) -> Vec<u32> {
        let mut ords: Vec<u32> = match self {
            Charset::Printable => (32..=126).collect(),
            Charset::Digits => (b'0' as u32..=b'9' as u32).collect(),
            Charset::Hex => "0123456789ABCDEFabcdef".chars().map(|c| c as u32).collect(),
            Charset::Custom(chars) => chars.chars().map(|c| c as u32).collect(),
        };
        ords.sort_unstable();
        ords.dedup();
        ords
    }
}

impl std::str::FromStr for Charset {
    type Err = BlindsightError;

    /// `printable`, `digits`, `hex`, or the literal characters to search.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "printable" => Ok(Charset::Printable),
            "digits" => Ok(Charset::Digits),
            "hex" => Ok(Charset::Hex),
            _ if s.is_empty() => Err(BlindsightError::Config("charset cannot be empty".into())),
            _ => Ok(Charset::Custom(s.to_string())),
        }
    }
}

/// Pagination window `[start, stop)` over row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Window {
    pub start: usize,
    pub stop: Option<usize>,
}

impl Window {
    pub fn new(start: usize, stop: Option<usize>) -> Self {
        Self { start, stop }
    }

    /// Row indices to fetch once the total row count is known.
    pub fn indices(&self, count: usize) -> Range<usize> {
        let stop = self.stop.map_or(count, |s| s.min(count));
        self.start.min(stop)..stop
    }
}

/// A single unknown scalar described by a SQL expression.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExtractionTarget {
    /// Stable key progress is stored under, e.g. `tables:shop:3`.
    pub key: String,
    pub expression: String,
    pub charset: Charset,
    /// Upper bound for length discovery when the schema caps the value.
    pub max_length: Option<usize>,
    /// Expected value; extraction stops at the first contradiction.
    pub expect: Option<String>,
}

impl ExtractionTarget {
    pub fn new(key: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expression: expression.into(),
            charset: Charset::default(),
            max_length: None,
            expect: None,
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn expecting(mut self, expected: impl Into<String>) -> Self {
        self.expect = Some(expected.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ExtractionResult {
    pub value: String,
    pub ok: bool,
    /// Discovered length, once known.
    pub length: Option<usize>,
    /// 1-based position where an expected value was contradicted (0 = length).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<usize>,
}

impl ExtractionResult {
    pub fn complete(value: impl Into<String>) -> Self {
        let value = value.into();
        let length = value.chars().count();
        Self { value, ok: true, length: Some(length), violation: None }
    }

    pub fn chars_confirmed(&self) -> usize {
        self.value.chars().count()
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.value.chars()
    }
}
