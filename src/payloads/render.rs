use rand::distributions::Alphanumeric;
use rand::Rng;

/// Per-injection-point values substituted into every payload.
#[derive(Debug, Clone, Default)]
pub struct RenderParams<'a> {
    /// Original parameter value; empty for custom markers, whose literal
    /// prefix stays in the request.
    pub original: &'a str,
    pub prefix: Option<&'a str>,
    pub suffix: Option<&'a str>,
    pub sleep_time: u64,
}

/// Fix `[RANDNUM]` and `[RANDSTR]` so a vector replays byte-identically.
pub fn instantiate(template: &str) -> String {
    let mut rng = rand::thread_rng();
    let num: u32 = rng.gen_range(1000..10000);
    let text: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .filter(|c| c.is_ascii_alphabetic())
        .take(4)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    template.replace("[RANDNUM]", &num.to_string()).replace("[RANDSTR]", &text)
}

/// Materialize a payload for one inference question.
pub fn render(template: &str, inference: &str, params: &RenderParams<'_>) -> String {
    let prefix = params.prefix.unwrap_or("");
    let mut out = if template.contains("[ORIGVALUE]") {
        template.replace("[ORIGVALUE]", &format!("{}{}", params.original, prefix))
    } else {
        format!("{}{}", prefix, template)
    };
    out = out
        .replace("[SLEEPTIME]", &params.sleep_time.to_string())
        .replace("[INFERENCE]", inference);
    if let Some(suffix) = params.suffix {
        out.push_str(suffix);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let params = RenderParams { original: "1", ..Default::default() };
        assert_eq!(render("[ORIGVALUE] AND ([INFERENCE])", "5=5", &params), "1 AND (5=5)");
    }

    #[test]
    fn test_render_prefix_suffix_and_sleep() {
        let params = RenderParams {
            original: "7",
            prefix: Some(")"),
            suffix: Some("-- -"),
            sleep_time: 3,
        };
        let out = render("[ORIGVALUE] AND SLEEP([SLEEPTIME]) AND ([INFERENCE])", "1=1", &params);
        assert_eq!(out, "7) AND SLEEP(3) AND (1=1)-- -");
    }

    #[test]
    fn test_instantiate_fixes_random_placeholders() {
        let fixed = instantiate("[RANDNUM]=[RANDNUM] '[RANDSTR]'='[RANDSTR]'");
        assert!(!fixed.contains('['));
        let parts: Vec<&str> = fixed.split(' ').collect();
        let (a, b) = parts[0].split_once('=').unwrap();
        assert_eq!(a, b);
        assert_eq!(parts[1].split_once('=').map(|(x, y)| x == y), Some(true));
    }
}
