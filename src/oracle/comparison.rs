use std::borrow::Cow;

use crate::config::EngineConfig;
use crate::http::HttpResponse;
use crate::models::Outcome;
use crate::utils::similarity::{is_similar, similarity_ratio, text_only};

/// Known-true and known-false responses for the current calibration.
#[derive(Debug, Clone)]
pub struct References {
    pub true_page: HttpResponse,
    pub false_page: HttpResponse,
}

/// Decides which branch a response belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PageComparator {
    pub code: Option<u16>,
    pub string: Option<String>,
    pub not_string: Option<String>,
    pub text_only: bool,
    pub threshold: f64,
    pub is_dynamic: bool,
}

impl PageComparator {
    pub fn from_config(config: &EngineConfig, is_dynamic: bool) -> Self {
        Self {
            code: config.code,
            string: config.string.clone(),
            not_string: config.not_string.clone(),
            text_only: config.text_only,
            threshold: config.similarity_threshold,
            is_dynamic,
        }
    }

    pub fn has_discriminator(&self) -> bool {
        self.code.is_some() || self.string.is_some() || self.not_string.is_some()
    }

    fn body<'r>(&self, response: &'r HttpResponse) -> Cow<'r, str> {
        if self.text_only {
            Cow::Owned(text_only(&response.body))
        } else {
            Cow::Borrowed(&response.body)
        }
    }

    /// Verdict from explicit discriminators alone. All supplied ones must hold.
    pub fn by_discriminator(&self, response: &HttpResponse) -> Option<Outcome> {
        if !self.has_discriminator() {
            return None;
        }
        let body = self.body(response);
        let truth = self.string.as_deref().map_or(true, |s| body.contains(s))
            && self.not_string.as_deref().map_or(true, |s| !body.contains(s))
            && self.code.map_or(true, |c| response.status == c);
        Some(Outcome::from_bool(truth))
    }

    /// Verdict by resemblance to the reference pages. Matching both or
    /// neither is INCONCLUSIVE.
    pub fn by_reference(&self, response: &HttpResponse, refs: &References) -> Outcome {
        let (ts, fs) = (refs.true_page.status, refs.false_page.status);
        if ts != fs {
            return if response.status == ts {
                Outcome::True
            } else if response.status == fs {
                Outcome::False
            } else {
                Outcome::Inconclusive
            };
        }

        let body = self.body(response);
        let true_body = self.body(&refs.true_page);
        let false_body = self.body(&refs.false_page);

        if !self.is_dynamic && true_body != false_body {
            if body == true_body {
                return Outcome::True;
            }
            if body == false_body {
                return Outcome::False;
            }
        }

        let like_true = is_similar(&body, &true_body, self.threshold);
        let like_false = is_similar(&body, &false_body, self.threshold);
        match (like_true, like_false) {
            (true, false) => Outcome::True,
            (false, true) => Outcome::False,
            _ => Outcome::Inconclusive,
        }
    }

    /// Whether the reference pages can be told apart at all.
    pub fn distinguishable(&self, refs: &References) -> bool {
        if refs.true_page.status != refs.false_page.status {
            return true;
        }
        let true_body = self.body(&refs.true_page);
        let false_body = self.body(&refs.false_page);
        if !self.is_dynamic {
            return true_body != false_body;
        }
        similarity_ratio(&true_body, &false_body) < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparator() -> PageComparator {
        PageComparator {
            code: None,
            string: None,
            not_string: None,
            text_only: false,
            threshold: 0.95,
            is_dynamic: false,
        }
    }

    fn refs() -> References {
        References {
            true_page: HttpResponse::new(200, "<h1>Item</h1><p>Blue widget, in stock</p>"),
            false_page: HttpResponse::new(200, "<h1>Item</h1><p>No results</p>"),
        }
    }

    #[test]
    fn test_static_exact_match() {
        let c = comparator();
        let r = refs();
        assert_eq!(c.by_reference(&r.true_page.clone(), &r), Outcome::True);
        assert_eq!(c.by_reference(&r.false_page.clone(), &r), Outcome::False);
    }

    #[test]
    fn test_unrelated_page_is_inconclusive() {
        let c = comparator();
        let page = HttpResponse::new(200, "Service Unavailable. Please retry later.");
        assert_eq!(c.by_reference(&page, &refs()), Outcome::Inconclusive);
    }

    #[test]
    fn test_status_split() {
        let c = comparator();
        let r = References {
            true_page: HttpResponse::new(200, "ok"),
            false_page: HttpResponse::new(404, "ok"),
        };
        assert_eq!(c.by_reference(&HttpResponse::new(404, "x"), &r), Outcome::False);
        assert_eq!(c.by_reference(&HttpResponse::new(500, "x"), &r), Outcome::Inconclusive);
        assert!(c.distinguishable(&r));
    }

    #[test]
    fn test_discriminators_combine() {
        let c = PageComparator {
            string: Some("in stock".into()),
            code: Some(200),
            ..comparator()
        };
        assert_eq!(c.by_discriminator(&refs().true_page), Some(Outcome::True));
        assert_eq!(c.by_discriminator(&refs().false_page), Some(Outcome::False));
        assert_eq!(comparator().by_discriminator(&refs().true_page), None);
    }

    #[test]
    fn test_not_string_discriminator() {
        let c = PageComparator { not_string: Some("No results".into()), ..comparator() };
        assert_eq!(c.by_discriminator(&refs().false_page), Some(Outcome::False));
        assert_eq!(c.by_discriminator(&refs().true_page), Some(Outcome::True));
    }

    #[test]
    fn test_identical_references_not_distinguishable() {
        let c = comparator();
        let same = References {
            true_page: HttpResponse::new(200, "same"),
            false_page: HttpResponse::new(200, "same"),
        };
        assert!(!c.distinguishable(&same));
        assert!(c.distinguishable(&refs()));
    }
}
