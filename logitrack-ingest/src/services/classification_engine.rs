//! Classification engine
//!
//! Primary path: the external zero-shot classifier, limited to a per-cycle
//! call budget and bounded by a timeout. Every failure, and every call the
//! budget does not cover, falls back to the heuristic rules.

use super::heuristics::HeuristicRules;
use super::inference_client::{HuggingFaceClient, InferenceClient};
use crate::feed::{NavHint, NavStatus};
use chrono::{DateTime, Utc};
use logitrack_common::config::ClassifierConfig;
use logitrack_common::Classification;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which path produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassificationSource {
    Inference,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
struct Anchoring {
    since: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// Current anchoring of each vessel
///
/// An anchoring ends on any non-anchor hint, or when the vessel has not
/// been seen at anchor for longer than the threshold.
#[derive(Debug)]
struct AnchorTracker {
    threshold: chrono::Duration,
    anchorings: HashMap<String, Anchoring>,
    newest: Option<DateTime<Utc>>,
}

impl AnchorTracker {
    fn new(threshold: Duration) -> Self {
        Self {
            threshold: chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX),
            anchorings: HashMap::new(),
            newest: None,
        }
    }

    /// Record a hint and report whether the anchoring has lasted the threshold
    fn observe(&mut self, external_id: &str, hint: Option<&NavHint>, at: DateTime<Utc>) -> bool {
        self.newest = Some(self.newest.map_or(at, |newest| newest.max(at)));

        match hint.map(|h| h.status) {
            Some(NavStatus::AtAnchor) => {
                let threshold = self.threshold;
                let anchoring = self
                    .anchorings
                    .entry(external_id.to_string())
                    .and_modify(|a| {
                        if at - a.last_seen > threshold {
                            a.since = at;
                        }
                        a.last_seen = a.last_seen.max(at);
                    })
                    .or_insert(Anchoring {
                        since: at,
                        last_seen: at,
                    });
                let anchored = at - anchoring.since;
                anchored >= chrono::Duration::zero() && anchored >= threshold
            }
            Some(_) => {
                self.anchorings.remove(external_id);
                false
            }
            None => false,
        }
    }

    /// Forget anchorings that can no longer continue
    fn prune(&mut self) {
        let Some(newest) = self.newest else {
            return;
        };
        let threshold = self.threshold;
        self.anchorings
            .retain(|_, anchoring| newest - anchoring.last_seen <= threshold);
    }

    fn len(&self) -> usize {
        self.anchorings.len()
    }
}

pub struct ClassificationEngine {
    client: Option<Arc<dyn InferenceClient>>,
    rules: HeuristicRules,
    quota_per_cycle: u32,
    remaining: u32,
    timeout: Duration,
    anchors: AnchorTracker,
}

impl ClassificationEngine {
    pub fn new(config: &ClassifierConfig, client: Option<Arc<dyn InferenceClient>>) -> Self {
        Self {
            client,
            rules: HeuristicRules::from_config(config),
            quota_per_cycle: config.quota_per_cycle,
            remaining: 0,
            timeout: config.timeout(),
            anchors: AnchorTracker::new(config.anchor_threshold()),
        }
    }

    /// Engine with the Hugging Face client when a key is configured,
    /// heuristics only otherwise
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let client: Option<Arc<dyn InferenceClient>> = match config.api_key {
            None => None,
            Some(_) => match HuggingFaceClient::new(config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(
                        error = %e,
                        "Inference client unavailable, using heuristic classification only"
                    );
                    None
                }
            },
        };
        if client.is_none() {
            debug!("No inference API key configured");
        }
        Self::new(config, client)
    }

    /// Restore the call budget and drop stale anchorings; called at the
    /// start of every cycle
    pub fn begin_cycle(&mut self) {
        self.remaining = self.quota_per_cycle;
        self.anchors.prune();
    }

    pub fn remaining_quota(&self) -> u32 {
        self.remaining
    }

    /// Vessels currently tracked as at anchor
    pub fn tracked_anchorings(&self) -> usize {
        self.anchors.len()
    }

    /// Classify one report, never failing
    pub async fn classify(
        &mut self,
        external_id: &str,
        raw_status_text: &str,
        nav_hint: Option<&NavHint>,
        observed_at: DateTime<Utc>,
    ) -> (Classification, ClassificationSource) {
        let sustained_anchor = self.anchors.observe(external_id, nav_hint, observed_at);

        if let Some(client) = self.client.as_ref().filter(|_| self.remaining > 0) {
            self.remaining -= 1;
            match tokio::time::timeout(self.timeout, client.classify(raw_status_text)).await {
                Ok(Ok(classification)) => return (classification, ClassificationSource::Inference),
                Ok(Err(e)) => {
                    debug!(external_id, error = %e, "Inference failed, using fallback");
                }
                Err(_) => {
                    debug!(
                        external_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Inference timed out, using fallback"
                    );
                }
            }
        }

        let classification = self.rules.classify(raw_status_text, nav_hint, sustained_anchor);
        (classification, ClassificationSource::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::inference_client::InferenceError;
    use async_trait::async_trait;
    use logitrack_common::DelayReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient {
        answer: Result<Classification, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(answer: Result<Classification, ()>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for FixedClient {
        async fn classify(&self, _text: &str) -> Result<Classification, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer.map_err(|_| InferenceError::Api(503, "model is loading".to_string()))
        }
    }

    fn config(quota: u32) -> ClassifierConfig {
        ClassifierConfig {
            quota_per_cycle: quota,
            timeout_ms: 50,
            anchor_threshold_secs: 3600,
            ..ClassifierConfig::default()
        }
    }

    #[tokio::test]
    async fn test_quota_limits_calls_per_cycle() {
        let client = FixedClient::new(Ok(Classification::Delivered));
        let shared: Arc<dyn InferenceClient> = client.clone();
        let mut engine = ClassificationEngine::new(&config(2), Some(shared));
        engine.begin_cycle();

        let now = Utc::now();
        let mut sources = Vec::new();
        for _ in 0..3 {
            sources.push(engine.classify("V1", "In transit", None, now).await.1);
        }
        assert_eq!(
            sources,
            vec![
                ClassificationSource::Inference,
                ClassificationSource::Inference,
                ClassificationSource::Fallback
            ]
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        engine.begin_cycle();
        assert_eq!(engine.remaining_quota(), 2);
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let client = FixedClient::new(Err(()));
        let mut engine = ClassificationEngine::new(&config(5), Some(client));
        engine.begin_cycle();

        let (classification, source) = engine
            .classify("V1", "Customs inspection in progress", None, Utc::now())
            .await;
        assert_eq!(classification, Classification::Delayed(DelayReason::Customs));
        assert_eq!(source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let client = Arc::new(FixedClient {
            answer: Ok(Classification::OnTime),
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        });
        let mut engine = ClassificationEngine::new(&config(5), Some(client));
        engine.begin_cycle();

        let (classification, source) = engine
            .classify("V1", "Package delivered successfully.", None, Utc::now())
            .await;
        assert_eq!(classification, Classification::Delivered);
        assert_eq!(source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_anchor_threshold_per_vessel() {
        let mut engine = ClassificationEngine::new(&config(0), None);
        engine.begin_cycle();
        let anchored = NavHint::new(NavStatus::AtAnchor);
        let under_way = NavHint::new(NavStatus::UnderWayUsingEngine);
        let t0 = Utc::now();
        let later = t0 + chrono::Duration::hours(1);

        let (first, _) = engine.classify("V1", "At anchor", Some(&anchored), t0).await;
        assert_eq!(first, Classification::OnTime);

        // Another vessel anchoring later does not inherit V1's start time
        let (other, _) = engine.classify("V2", "At anchor", Some(&anchored), later).await;
        assert_eq!(other, Classification::OnTime);

        let (held, _) = engine.classify("V1", "At anchor", Some(&anchored), later).await;
        assert_eq!(held, Classification::Delayed(DelayReason::PortCongestion));

        engine.classify("V1", "Under way", Some(&under_way), later).await;
        let (reset, _) = engine
            .classify("V1", "At anchor", Some(&anchored), later + chrono::Duration::minutes(1))
            .await;
        assert_eq!(reset, Classification::OnTime);
    }

    #[tokio::test]
    async fn test_anchoring_expires_after_silence() {
        let mut engine = ClassificationEngine::new(&config(0), None);
        engine.begin_cycle();
        let anchored = NavHint::new(NavStatus::AtAnchor);
        let t0 = Utc::now();

        engine.classify("V1", "At anchor", Some(&anchored), t0).await;
        // Reappears at anchor two days later: a new anchoring, not a sustained one
        let (back, _) = engine
            .classify("V1", "At anchor", Some(&anchored), t0 + chrono::Duration::days(2))
            .await;
        assert_eq!(back, Classification::OnTime);

        // Regular reports keep the anchoring alive
        let mut at = t0 + chrono::Duration::days(2);
        for _ in 0..4 {
            at += chrono::Duration::minutes(30);
            engine.classify("V1", "At anchor", Some(&anchored), at).await;
        }
        let (held, _) = engine
            .classify("V1", "At anchor", Some(&anchored), at + chrono::Duration::minutes(30))
            .await;
        assert_eq!(held, Classification::Delayed(DelayReason::PortCongestion));
    }

    #[tokio::test]
    async fn test_begin_cycle_prunes_departed_vessels() {
        let mut engine = ClassificationEngine::new(&config(0), None);
        engine.begin_cycle();
        let anchored = NavHint::new(NavStatus::AtAnchor);
        let t0 = Utc::now();

        engine.classify("GONE", "At anchor", Some(&anchored), t0).await;
        engine.classify("STAY", "At anchor", Some(&anchored), t0).await;
        engine.begin_cycle();
        assert_eq!(engine.tracked_anchorings(), 2);

        let later = t0 + chrono::Duration::hours(3);
        engine.classify("STAY", "At anchor", Some(&anchored), later).await;
        engine.classify("OTHER", "Under way", None, later).await;
        engine.begin_cycle();
        assert_eq!(engine.tracked_anchorings(), 1);
    }
}
