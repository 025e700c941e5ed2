use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::condition::{Condition, Inference};
use crate::config::EngineConfig;
use crate::errors::BlindsightError;
use crate::models::{Charset, ExtractionResult, ExtractionTarget, Technique};
use crate::pipeline::events::EngineEvent;

/// Upper bound for length discovery when the target names none.
pub const HARD_MAX_LENGTH: u64 = 65_536;
/// Upper bound for row counts.
pub const MAX_COUNT: u64 = 1 << 31;
const MAX_ORDINAL: u32 = 0x10FFFF;

/// Receives progress after every resolved character.
pub trait ProgressSink: Send + Sync {
    fn checkpoint(&self, key: &str, result: &ExtractionResult) -> Result<(), BlindsightError>;
}

#[derive(Debug, Clone)]
pub struct BisectionSettings {
    /// Consecutive INCONCLUSIVE answers tolerated per question.
    pub retries: u32,
    /// Confirm every character with an equality query.
    pub verify_characters: bool,
}

impl BisectionSettings {
    pub fn from_config(config: &EngineConfig, technique: Technique) -> Self {
        Self {
            retries: config.retries,
            verify_characters: technique == Technique::Time,
        }
    }
}

/// Why a search stopped before an answer.
#[derive(Debug)]
enum Stop {
    Inconclusive(String),
    Cancelled,
}

/// Recovers unknown values one ordinal comparison at a time.
pub struct BisectionExtractor {
    settings: BisectionSettings,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl BisectionExtractor {
    pub fn new(settings: BisectionSettings) -> Self {
        Self {
            settings,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Resolve `target`, continuing from `resume` when given. Partial
    /// failures come back as `ok = false`; only sink failures are errors.
    pub async fn extract(
        &self,
        inference: &mut dyn Inference,
        target: &ExtractionTarget,
        resume: Option<ExtractionResult>,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ExtractionResult, BlindsightError> {
        let mut result = resume.unwrap_or_default();
        if result.ok {
            debug!(key = %target.key, "Value already resolved");
            return Ok(result);
        }
        result.violation = None;

        if let Some(expected) = &target.expect {
            return self.check_expected(inference, target, expected, result, sink).await;
        }

        let length = match result.length {
            Some(length) => length,
            None => {
                let cap = target.max_length.map_or(HARD_MAX_LENGTH, |m| (m as u64).min(HARD_MAX_LENGTH));
                let expression = target.expression.as_str();
                let above = |threshold: u64| Condition::LengthGreaterThan { expression: expression.to_string(), threshold };
                match self.discover_number(inference, above, cap).await {
                    Ok(length) => {
                        let length = length as usize;
                        result.length = Some(length);
                        checkpoint(sink, &target.key, &result)?;
                        debug!(key = %target.key, length, "Length resolved");
                        self.emit(EngineEvent::LengthResolved { key: target.key.clone(), length });
                        length
                    }
                    Err(stop) => return Ok(self.abort(target, result, stop)),
                }
            }
        };

        let mut ordinals = target.charset.ordinals();
        if ordinals.is_empty() {
            ordinals = Charset::Printable.ordinals();
        }

        let confirmed = result.chars_confirmed();
        if confirmed > length {
            result.value = result.value.chars().take(length).collect();
        }
        for position in confirmed + 1..=length {
            match self.resolve_char(inference, &target.expression, position, &ordinals).await {
                Ok(c) => {
                    result.value.push(c);
                    checkpoint(sink, &target.key, &result)?;
                    trace!(key = %target.key, position, partial = %result.value, "Character resolved");
                    self.emit(EngineEvent::CharacterResolved {
                        key: target.key.clone(),
                        position,
                        partial: result.value.clone(),
                    });
                }
                Err(stop) => return Ok(self.abort(target, result, stop)),
            }
        }

        result.ok = true;
        checkpoint(sink, &target.key, &result)?;
        Ok(result)
    }

    /// Numeric value of `expression`, e.g. a row count. `None` on abort.
    pub async fn count(&self, inference: &mut dyn Inference, expression: &str) -> Option<u64> {
        let above = |threshold: u64| Condition::ValueGreaterThan { expression: expression.to_string(), threshold };
        match self.discover_number(inference, above, MAX_COUNT).await {
            Ok(n) => Some(n),
            Err(stop) => {
                warn!(expression, reason = ?stop, "Count could not be resolved");
                None
            }
        }
    }

    async fn check_expected(
        &self,
        inference: &mut dyn Inference,
        target: &ExtractionTarget,
        expected: &str,
        mut result: ExtractionResult,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ExtractionResult, BlindsightError> {
        let expected_len = expected.chars().count() as u64;
        let mismatch = result.chars().zip(expected.chars()).position(|(a, b)| a != b);
        if let Some(index) = mismatch {
            result.value = result.value.chars().take(index).collect();
            result.violation = Some(index + 1);
            result.ok = false;
            return Ok(result);
        }
        if result.length.is_some_and(|l| l as u64 != expected_len) || result.chars_confirmed() as u64 > expected_len {
            result.violation = Some(0);
            result.ok = false;
            return Ok(result);
        }

        let above = |threshold: u64| Condition::LengthGreaterThan { expression: target.expression.clone(), threshold };

        let length_matches = if result.length.is_some() {
            Ok(true)
        } else if expected_len == 0 {
            self.decide(inference, &above(0)).await.map(|longer| !longer)
        } else {
            match self.decide(inference, &above(expected_len - 1)).await {
                Ok(true) => self.decide(inference, &above(expected_len)).await.map(|longer| !longer),
                other => other,
            }
        };
        match length_matches {
            Ok(true) => result.length = Some(expected_len as usize),
            Ok(false) => {
                debug!(key = %target.key, "Length contradicts the expected value");
                result.violation = Some(0);
                result.ok = false;
                return Ok(result);
            }
            Err(stop) => return Ok(self.abort(target, result, stop)),
        }

        let confirmed = result.chars_confirmed();
        for (index, ch) in expected.chars().enumerate().skip(confirmed) {
            let position = index + 1;
            let equals = Condition::CharEquals {
                expression: target.expression.clone(),
                position,
                ordinal: ch as u32,
            };
            match self.decide(inference, &equals).await {
                Ok(true) => {
                    result.value.push(ch);
                    checkpoint(sink, &target.key, &result)?;
                }
                Ok(false) => {
                    debug!(key = %target.key, position, "Character contradicts the expected value");
                    result.violation = Some(position);
                    result.ok = false;
                    return Ok(result);
                }
                Err(stop) => return Ok(self.abort(target, result, stop)),
            }
        }

        result.ok = true;
        checkpoint(sink, &target.key, &result)?;
        Ok(result)
    }

    fn abort(&self, target: &ExtractionTarget, mut result: ExtractionResult, stop: Stop) -> ExtractionResult {
        result.ok = false;
        match stop {
            Stop::Cancelled => warn!(key = %target.key, partial = %result.value, "Extraction cancelled"),
            Stop::Inconclusive(reason) => {
                warn!(key = %target.key, partial = %result.value, reason = %reason, "Extraction aborted after repeated inconclusive answers")
            }
        }
        result
    }

    /// A decisive answer, asking again while INCONCLUSIVE up to `retries` times.
    async fn decide(&self, inference: &mut dyn Inference, condition: &Condition) -> Result<bool, Stop> {
        let mut misses = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let verdict = inference.infer(condition).await;
            if let Some(answer) = verdict.outcome.decisive() {
                return Ok(answer);
            }
            misses += 1;
            debug!(misses, evidence = %verdict.evidence, "Inconclusive answer");
            if misses > self.settings.retries {
                return Err(Stop::Inconclusive(verdict.evidence));
            }
        }
    }

    /// Smallest `n` in `[0, cap]` for which `above(n)` is false: exponential
    /// probing from 1, then binary search inside the last doubling.
    async fn discover_number<F>(&self, inference: &mut dyn Inference, above: F, cap: u64) -> Result<u64, Stop>
    where
        F: Fn(u64) -> Condition,
    {
        let cap = cap.max(1);
        if !self.decide(inference, &above(0)).await? {
            return Ok(0);
        }
        let mut low = 0u64;
        let mut probe = 1u64;
        let mut high = loop {
            if probe >= cap {
                break cap;
            }
            if self.decide(inference, &above(probe)).await? {
                low = probe;
                probe = probe.saturating_mul(2);
            } else {
                break probe;
            }
        };
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if self.decide(inference, &above(mid)).await? {
                low = mid;
            } else {
                high = mid;
            }
        }
        Ok(high)
    }

    async fn resolve_char(
        &self,
        inference: &mut dyn Inference,
        expression: &str,
        position: usize,
        ordinals: &[u32],
    ) -> Result<char, Stop> {
        let mut mismatches = 0u32;
        loop {
            let (ordinal, out_of_range) = self.search_ordinal(inference, expression, position, ordinals).await?;
            let verified = if self.settings.verify_characters || out_of_range {
                let equals = Condition::CharEquals { expression: expression.to_string(), position, ordinal };
                self.decide(inference, &equals).await?
            } else {
                true
            };
            if verified {
                return char::from_u32(ordinal)
                    .ok_or_else(|| Stop::Inconclusive(format!("ordinal {} is not a character", ordinal)));
            }
            mismatches += 1;
            warn!(position, ordinal, mismatches, "Character verification failed");
            if mismatches > self.settings.retries {
                return Err(Stop::Inconclusive(format!("character {} never verified", position)));
            }
        }
    }

    /// Binary search over the alphabet padded with one sentinel below and
    /// above. Landing on a sentinel widens the search to the full ordinal
    /// range on that side.
    async fn search_ordinal(
        &self,
        inference: &mut dyn Inference,
        expression: &str,
        position: usize,
        ordinals: &[u32],
    ) -> Result<(u32, bool), Stop> {
        let greater = |ordinal: u32| Condition::CharGreaterThan { expression: expression.to_string(), position, ordinal };

        let below = ordinals.first().and_then(|o| o.checked_sub(1));
        let above = ordinals.last().map_or(0, |o| o + 1);
        let mut candidates = Vec::with_capacity(ordinals.len() + 2);
        candidates.extend(below);
        candidates.extend_from_slice(ordinals);
        candidates.push(above);

        let (mut lo, mut hi) = (0usize, candidates.len() - 1);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.decide(inference, &greater(candidates[mid])).await? {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let (mut wide_lo, mut wide_hi) = match (below, lo) {
            (Some(sentinel), 0) => (0, sentinel),
            _ if lo == candidates.len() - 1 => (above, MAX_ORDINAL),
            _ => return Ok((candidates[lo], false)),
        };
        debug!(position, "Character outside the alphabet, widening search");
        while wide_lo < wide_hi {
            let mid = wide_lo + (wide_hi - wide_lo) / 2;
            if self.decide(inference, &greater(mid)).await? {
                wide_lo = mid + 1;
            } else {
                wide_hi = mid;
            }
        }
        Ok((wide_lo, true))
    }
}

fn checkpoint(sink: Option<&dyn ProgressSink>, key: &str, result: &ExtractionResult) -> Result<(), BlindsightError> {
    match sink {
        Some(sink) => sink.checkpoint(key, result),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{OracleVerdict, Outcome};

    /// Answers truthfully about a known string.
    struct Secret {
        value: Vec<char>,
        calls: usize,
        asked: Vec<Condition>,
        technique: Technique,
    }

    impl Secret {
        fn new(value: &str) -> Self {
            Self { value: value.chars().collect(), calls: 0, asked: Vec::new(), technique: Technique::Boolean }
        }
    }

    #[async_trait]
    impl Inference for Secret {
        async fn infer(&mut self, condition: &Condition) -> OracleVerdict {
            self.calls += 1;
            self.asked.push(condition.clone());
            let truth = match condition {
                Condition::LengthGreaterThan { threshold, .. } => self.value.len() as u64 > *threshold,
                Condition::ValueGreaterThan { threshold, .. } => {
                    self.value.iter().collect::<String>().parse::<u64>().unwrap_or(0) > *threshold
                }
                Condition::CharGreaterThan { position, ordinal, .. } => self.value[position - 1] as u32 > *ordinal,
                Condition::CharEquals { position, ordinal, .. } => self.value[position - 1] as u32 == *ordinal,
            };
            OracleVerdict::new(Outcome::from_bool(truth), Duration::ZERO, "")
        }

        fn technique(&self) -> Technique {
            self.technique
        }
    }

    /// Evaluates rendered MySQL the way the server does: `LENGTH` in bytes,
    /// `CHAR_LENGTH` and `MID` in characters.
    struct MysqlValue(String);

    #[async_trait]
    impl Inference for MysqlValue {
        async fn infer(&mut self, condition: &Condition) -> OracleVerdict {
            let sql = condition.render(&crate::dialect::Dialect::mysql());
            let chars: Vec<char> = self.0.chars().collect();
            let ordinal_at = |position: usize| chars.get(position - 1).map_or(0, |c| *c as u32);
            let truth = if let Some(n) = sql.strip_prefix("CHAR_LENGTH((x))>") {
                chars.len() as u64 > n.parse::<u64>().unwrap()
            } else if let Some(n) = sql.strip_prefix("LENGTH((x))>") {
                self.0.len() as u64 > n.parse::<u64>().unwrap()
            } else {
                match condition {
                    Condition::CharGreaterThan { position, ordinal, .. } => ordinal_at(*position) > *ordinal,
                    Condition::CharEquals { position, ordinal, .. } => ordinal_at(*position) == *ordinal,
                    _ => false,
                }
            };
            OracleVerdict::new(Outcome::from_bool(truth), Duration::ZERO, "")
        }

        fn technique(&self) -> Technique {
            Technique::Boolean
        }
    }

    /// INCONCLUSIVE forever.
    struct Silent;

    #[async_trait]
    impl Inference for Silent {
        async fn infer(&mut self, _condition: &Condition) -> OracleVerdict {
            OracleVerdict::inconclusive("no signal")
        }

        fn technique(&self) -> Technique {
            Technique::Boolean
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ExtractionResult>>);

    impl ProgressSink for Recorder {
        fn checkpoint(&self, _key: &str, result: &ExtractionResult) -> Result<(), BlindsightError> {
            self.0.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    fn extractor() -> BisectionExtractor {
        BisectionExtractor::new(BisectionSettings { retries: 2, verify_characters: false })
    }

    #[tokio::test]
    async fn test_extracts_admin() {
        let mut secret = Secret::new("admin");
        let target = ExtractionTarget::new("current_user", "USER()");
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert_eq!(result, ExtractionResult { value: "admin".into(), ok: true, length: Some(5), violation: None });
    }

    #[tokio::test]
    async fn test_zero_length_skips_characters() {
        let mut secret = Secret::new("");
        let target = ExtractionTarget::new("empty", "''");
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.length, Some(0));
        assert_eq!(secret.calls, 1);
    }

    #[tokio::test]
    async fn test_out_of_alphabet_character() {
        let mut secret = Secret::new("a\u{e9}b");
        let target = ExtractionTarget::new("accent", "x");
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.value, "a\u{e9}b");
    }

    #[tokio::test]
    async fn test_single_character_costs_one_length_round_and_one_bisection() {
        let mut secret = Secret::new("x");
        let target = ExtractionTarget::new("v", "x");
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert_eq!(result.value, "x");

        let length_questions = secret
            .asked
            .iter()
            .filter(|c| matches!(c, Condition::LengthGreaterThan { .. }))
            .count();
        assert_eq!(length_questions, 2);
        let char_questions: Vec<&Condition> = secret.asked.iter().skip(length_questions).collect();
        assert!((6..=7).contains(&char_questions.len()), "{} character questions", char_questions.len());
        assert!(char_questions
            .iter()
            .all(|c| matches!(c, Condition::CharGreaterThan { position: 1, .. })));
    }

    #[tokio::test]
    async fn test_multibyte_value_under_mysql_length_semantics() {
        let target = ExtractionTarget::new("v", "x");
        let result = extractor().extract(&mut MysqlValue("caf\u{e9}".into()), &target, None, None).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.value, "caf\u{e9}");
        assert_eq!(result.length, Some(4));
    }

    #[tokio::test]
    async fn test_digits_charset() {
        let mut secret = Secret::new("4096");
        let target = ExtractionTarget::new("n", "x").with_charset(Charset::Digits);
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert_eq!(result.value, "4096");
    }

    #[tokio::test]
    async fn test_max_length_clamps_length_search() {
        let mut secret = Secret::new("abcdefghij");
        let target = ExtractionTarget::new("v", "x").with_max_length(10);
        let result = extractor().extract(&mut secret, &target, None, None).await.unwrap();
        assert_eq!(result.value, "abcdefghij");
    }

    #[tokio::test]
    async fn test_inconclusive_aborts() {
        let target = ExtractionTarget::new("v", "x");
        let result = extractor().extract(&mut Silent, &target, None, None).await.unwrap();
        assert!(!result.ok);
        assert!(result.value.is_empty());
    }

    #[tokio::test]
    async fn test_checkpoints_every_character() {
        let mut secret = Secret::new("abc");
        let recorder = Recorder::default();
        let target = ExtractionTarget::new("v", "x");
        extractor().extract(&mut secret, &target, None, Some(&recorder)).await.unwrap();
        let seen: Vec<String> = recorder.0.lock().unwrap().iter().map(|r| r.value.clone()).collect();
        assert_eq!(seen, vec!["", "a", "ab", "abc", "abc"]);
    }

    #[tokio::test]
    async fn test_resume_does_not_requery_prefix() {
        let partial = ExtractionResult { value: "adm".into(), ok: false, length: Some(5), violation: None };
        let mut secret = Secret::new("admin");
        let target = ExtractionTarget::new("v", "x");
        let result = extractor().extract(&mut secret, &target, Some(partial), None).await.unwrap();
        assert_eq!(result.value, "admin");
        assert!(secret.calls <= 14);
    }

    #[tokio::test]
    async fn test_expected_value() {
        let target = ExtractionTarget::new("v", "x").expecting("admin");
        let ok = extractor().extract(&mut Secret::new("admin"), &target, None, None).await.unwrap();
        assert!(ok.ok);

        let wrong_char = extractor().extract(&mut Secret::new("admix"), &target, None, None).await.unwrap();
        assert!(!wrong_char.ok);
        assert_eq!(wrong_char.violation, Some(5));
        assert_eq!(wrong_char.value, "admi");

        let wrong_len = extractor().extract(&mut Secret::new("root"), &target, None, None).await.unwrap();
        assert_eq!(wrong_len.violation, Some(0));
    }

    #[tokio::test]
    async fn test_expected_value_checks_resumed_prefix_without_queries() {
        let target = ExtractionTarget::new("v", "x").expecting("admin");
        let partial = ExtractionResult { value: "roo".into(), ok: false, length: Some(4), violation: None };
        let mut secret = Secret::new("root");
        let result = extractor().extract(&mut secret, &target, Some(partial), None).await.unwrap();
        assert_eq!(result.violation, Some(1));
        assert_eq!(result.value, "");
        assert!(!result.ok);
        assert_eq!(secret.calls, 0);
    }

    #[tokio::test]
    async fn test_count() {
        let mut secret = Secret::new("37");
        assert_eq!(extractor().count(&mut secret, "SELECT COUNT(*) FROM t").await, Some(37));
        assert_eq!(extractor().count(&mut Silent, "SELECT 1").await, None);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_extraction() {
        let token = CancellationToken::new();
        token.cancel();
        let target = ExtractionTarget::new("v", "x");
        let result = extractor()
            .with_cancel_token(token)
            .extract(&mut Secret::new("abc"), &target, None, None)
            .await
            .unwrap();
        assert!(!result.ok);
    }
}
