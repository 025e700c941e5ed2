use serde::{Deserialize, Serialize};

use crate::dialect::Backend;
use crate::errors::BlindsightError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Technique {
    Boolean,
    Error,
    Time,
}

impl Technique {
    pub const ALL: [Technique; 3] = [Technique::Boolean, Technique::Error, Technique::Time];

    pub fn letter(&self) -> char {
        match self {
            Self::Boolean => 'B',
            Self::Error => 'E',
            Self::Time => 'T',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'B' => Some(Self::Boolean),
            'E' => Some(Self::Error),
            'T' => Some(Self::Time),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean-based blind",
            Self::Error => "error-based",
            Self::Time => "time-based blind",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::Error => 1 << 1,
            Self::Time => 1 << 2,
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enabled techniques, parsed from letters such as `"BT"` or `"BET"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TechniqueSet(u8);

impl TechniqueSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Technique::ALL.iter().fold(Self::empty(), |set, t| set.with(*t))
    }

    pub fn parse(letters: &str) -> Result<Self, BlindsightError> {
        letters.chars().filter(|c| !c.is_whitespace()).try_fold(Self::empty(), |set, c| {
            Technique::from_letter(c)
                .map(|t| set.with(t))
                .ok_or_else(|| BlindsightError::Config(format!("Unknown technique letter '{}'", c)))
        })
    }

    pub fn with(self, technique: Technique) -> Self {
        Self(self.0 | technique.bit())
    }

    pub fn contains(&self, technique: Technique) -> bool {
        self.0 & technique.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Enabled techniques in the given priority order.
    pub fn ordered(&self, priority: &[Technique]) -> Vec<Technique> {
        let mut out: Vec<Technique> = priority.iter().copied().filter(|t| self.contains(*t)).collect();
        for t in Technique::ALL {
            if self.contains(t) && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }
}

impl TryFrom<String> for TechniqueSet {
    type Error = BlindsightError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TechniqueSet> for String {
    fn from(set: TechniqueSet) -> Self {
        set.to_string()
    }
}

impl std::fmt::Display for TechniqueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for t in Technique::ALL {
            if self.contains(t) {
                write!(f, "{}", t.letter())?;
            }
        }
        Ok(())
    }
}

/// How an oracle tells a true predicate from a false one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Comparison {
    Boolean {
        match_string: Option<String>,
        not_match_string: Option<String>,
        code: Option<u16>,
        text_only: bool,
    },
    Time {
        timesec: u64,
        threshold_ms: u64,
    },
    Error {
        signature: String,
    },
}

impl Comparison {
    pub fn marker(&self) -> String {
        match self {
            Comparison::Boolean { match_string: Some(s), .. } => format!("string={}", s),
            Comparison::Boolean { not_match_string: Some(s), .. } => format!("not-string={}", s),
            Comparison::Boolean { code: Some(c), .. } => format!("code={}", c),
            Comparison::Boolean { .. } => "page similarity".to_string(),
            Comparison::Time { threshold_ms, .. } => format!("elapsed>={}ms", threshold_ms),
            Comparison::Error { signature } => format!("error~/{}/", signature),
        }
    }
}

/// A payload template proven to control the oracle for one injection point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Vector {
    pub technique: Technique,
    pub title: String,
    /// Template with random placeholders already fixed; `[INFERENCE]` remains.
    pub template: String,
    pub comparison: Comparison,
    pub backend: Option<Backend>,
}

/// One slot per technique, filled as techniques confirm.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VectorSet {
    pub error: Option<Vector>,
    pub boolean: Option<Vector>,
    pub time: Option<Vector>,
}

impl VectorSet {
    pub fn insert(&mut self, vector: Vector) {
        match vector.technique {
            Technique::Error => self.error = Some(vector),
            Technique::Boolean => self.boolean = Some(vector),
            Technique::Time => self.time = Some(vector),
        }
    }

    pub fn get(&self, technique: Technique) -> Option<&Vector> {
        match technique {
            Technique::Error => self.error.as_ref(),
            Technique::Boolean => self.boolean.as_ref(),
            Technique::Time => self.time.as_ref(),
        }
    }

    /// The vector extraction should use: error, then boolean, then time.
    pub fn primary(&self) -> Option<&Vector> {
        self.error.as_ref().or(self.boolean.as_ref()).or(self.time.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vector> {
        [self.error.as_ref(), self.boolean.as_ref(), self.time.as_ref()]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(technique: Technique) -> Vector {
        Vector {
            technique,
            title: "test".into(),
            template: "[ORIGVALUE] AND ([INFERENCE])".into(),
            comparison: Comparison::Error { signature: "x".into() },
            backend: None,
        }
    }

    #[test]
    fn test_technique_set_parse() {
        let set = TechniqueSet::parse("bt").unwrap();
        assert!(set.contains(Technique::Boolean));
        assert!(set.contains(Technique::Time));
        assert!(!set.contains(Technique::Error));
        assert_eq!(set.to_string(), "BT");
    }

    #[test]
    fn test_technique_set_rejects_unknown() {
        assert!(TechniqueSet::parse("BX").is_err());
    }

    #[test]
    fn test_technique_set_ordered_by_priority() {
        let set = TechniqueSet::parse("EBT").unwrap();
        let order = set.ordered(&[Technique::Time, Technique::Boolean]);
        assert_eq!(order, vec![Technique::Time, Technique::Boolean, Technique::Error]);
    }

    #[test]
    fn test_technique_set_serde_as_letters() {
        let set = TechniqueSet::parse("BE").unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), "\"BE\"");
        let back: TechniqueSet = serde_json::from_str("\"T\"").unwrap();
        assert!(back.contains(Technique::Time));
    }

    #[test]
    fn test_vector_set_primary_prefers_error() {
        let mut set = VectorSet::default();
        set.insert(vector(Technique::Time));
        assert_eq!(set.primary().map(|v| v.technique), Some(Technique::Time));
        set.insert(vector(Technique::Boolean));
        assert_eq!(set.primary().map(|v| v.technique), Some(Technique::Boolean));
        set.insert(vector(Technique::Error));
        assert_eq!(set.primary().map(|v| v.technique), Some(Technique::Error));
        assert_eq!(set.iter().count(), 3);
    }
}
