use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use similar::{ChangeTag, TextDiff};

static SCRIPT_OR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

const DIFF_TIMEOUT: Duration = Duration::from_millis(500);
const MIN_MATCH_STRING: usize = 3;
const MAX_MATCH_STRING: usize = 100;

pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_empty() || b.is_empty() {
        return false;
    }

    similarity_ratio(a, b) >= threshold
}

/// Word-level similarity in `[0, 1]`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    TextDiff::configure()
        .timeout(DIFF_TIMEOUT)
        .diff_words(a, b)
        .ratio() as f64
}

/// Visible text only: scripts, styles and tags removed, whitespace collapsed.
pub fn text_only(body: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(body, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

/// A line present in `true_page` and absent from `false_page`, usable as a
/// discriminating match string.
pub fn derive_match_string(true_page: &str, false_page: &str) -> Option<String> {
    let diff = TextDiff::configure()
        .timeout(DIFF_TIMEOUT)
        .diff_lines(false_page, true_page);

    diff.iter_all_changes()
        .filter(|change| change.tag() == ChangeTag::Insert)
        .map(|change| text_only(change.value()))
        .filter(|line| line.chars().count() >= MIN_MATCH_STRING)
        .map(|line| line.chars().take(MAX_MATCH_STRING).collect::<String>())
        .filter(|line| true_page.contains(line.as_str()) && !false_page.contains(line.as_str()))
        .max_by_key(|line| line.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_similar() {
        assert!(is_similar("<p>hello</p>", "<p>hello</p>", 0.99));
    }

    #[test]
    fn test_small_token_change_stays_similar() {
        let a = "Welcome back user. Your cart has 3 items. Token 1111";
        let b = "Welcome back user. Your cart has 3 items. Token 2222";
        assert!(similarity_ratio(a, b) > 0.8);
        assert!(!is_similar(a, "Error", 0.5));
    }

    #[test]
    fn test_text_only_strips_markup() {
        let html = "<html><script>var x=1;</script><body><h1>Hi</h1>\n  there</body></html>";
        assert_eq!(text_only(html), "Hi there");
    }

    #[test]
    fn test_derive_match_string() {
        let true_page = "<html>\n<h1>Product</h1>\n<p>Blue widget in stock</p>\n</html>";
        let false_page = "<html>\n<h1>Product</h1>\n</html>";
        assert_eq!(
            derive_match_string(true_page, false_page).as_deref(),
            Some("Blue widget in stock")
        );
    }

    #[test]
    fn test_derive_match_string_none_when_equal() {
        assert!(derive_match_string("same\npage", "same\npage").is_none());
    }
}
