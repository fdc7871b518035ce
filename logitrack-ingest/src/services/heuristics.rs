//! Deterministic fallback classifier
//!
//! Ordered keyword rules over the lower-cased status text, plus the
//! navigational hint. Total: every input yields a classification.
//!
//! Keywords match whole words, so "late" hits "late arrival" but not
//! "latest" or "translated". A keyword ending in `*` matches any word that
//! starts with it: "congest*" hits "congestion".

use crate::feed::{NavHint, NavStatus};
use logitrack_common::config::ClassifierConfig;
use logitrack_common::{Classification, DelayReason};

#[derive(Debug, Clone)]
pub struct HeuristicRules {
    weather: Vec<Keyword>,
    customs: Vec<Keyword>,
    congestion: Vec<Keyword>,
    delay: Vec<Keyword>,
    delivered: Vec<Keyword>,
}

fn normalize_keywords(list: &[String]) -> Vec<Keyword> {
    list.iter().filter_map(|k| Keyword::parse(k)).collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Keyword {
    text: String,
    prefix: bool,
}

impl Keyword {
    fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let (text, prefix) = match lowered.strip_suffix('*') {
            Some(stem) => (stem.trim_end().to_string(), true),
            None => (lowered, false),
        };
        if text.is_empty() {
            None
        } else {
            Some(Self { text, prefix })
        }
    }

    /// True if the keyword occurs in `text` starting at a word boundary, and
    /// also ending at one unless it is a prefix keyword
    fn matches(&self, text: &str) -> bool {
        text.match_indices(self.text.as_str()).any(|(idx, found)| {
            let starts_word = text[..idx]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let ends_word = self.prefix
                || text[idx + found.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !c.is_alphanumeric());
            starts_word && ends_word
        })
    }
}

fn any_keyword(text: &str, keywords: &[Keyword]) -> bool {
    keywords.iter().any(|k| k.matches(text))
}

impl HeuristicRules {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            weather: normalize_keywords(&config.weather_keywords),
            customs: normalize_keywords(&config.customs_keywords),
            congestion: normalize_keywords(&config.congestion_keywords),
            delay: normalize_keywords(&config.delay_keywords),
            delivered: normalize_keywords(&config.delivered_keywords),
        }
    }

    /// Classify one report
    ///
    /// `sustained_anchor` is true when the vessel has been at anchor for at
    /// least the configured threshold.
    pub fn classify(
        &self,
        raw_status_text: &str,
        nav_hint: Option<&NavHint>,
        sustained_anchor: bool,
    ) -> Classification {
        let text = raw_status_text.to_lowercase();

        if any_keyword(&text, &self.weather) {
            return Classification::Delayed(DelayReason::Weather);
        }
        if any_keyword(&text, &self.customs) {
            return Classification::Delayed(DelayReason::Customs);
        }
        if any_keyword(&text, &self.congestion) {
            return Classification::Delayed(DelayReason::PortCongestion);
        }
        if sustained_anchor {
            return Classification::Delayed(DelayReason::PortCongestion);
        }
        if any_keyword(&text, &self.delay) {
            return Classification::Delayed(DelayReason::Other);
        }
        let moored = nav_hint.map_or(false, |h| h.status == NavStatus::Moored);
        if any_keyword(&text, &self.delivered) || moored {
            return Classification::Delivered;
        }
        Classification::OnTime
    }
}

impl Default for HeuristicRules {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}
