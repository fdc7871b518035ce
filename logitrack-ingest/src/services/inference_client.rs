//! Zero-shot classification client
//!
//! Talks to a Hugging Face Inference API compatible endpoint. Every call is
//! paced by a local rate limiter matching the service's request limit.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use logitrack_common::config::ClassifierConfig;
use logitrack_common::{Classification, DelayReason};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;

const USER_AGENT: &str = concat!("logitrack-ingest/", env!("CARGO_PKG_VERSION"));

/// Labels offered to the model, in request order
pub const CANDIDATE_LABELS: [&str; 6] = [
    "On Time",
    "Delayed",
    "Customs Issue",
    "Weather Delay",
    "Port Congestion",
    "Delivered",
];

/// Scores closer than this are a tie
const TIE_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response")]
    Empty,

    #[error("Top score {score:.3} below confidence floor {floor:.3}")]
    LowConfidence { score: f64, floor: f64 },

    #[error("Top labels tied at {0:.3}")]
    Ambiguous(f64),

    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    #[error("Missing API key")]
    MissingApiKey,
}

/// External classifier seam; the engine only sees this trait
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters,
}

#[derive(Debug, Serialize)]
struct ZeroShotParameters {
    candidate_labels: [&'static str; 6],
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ZeroShotResponse {
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub scores: Vec<f64>,
}

/// The endpoint answers with either one object or a one-element list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseBody {
    Single(ZeroShotResponse),
    Batch(Vec<ZeroShotResponse>),
}

impl ResponseBody {
    fn into_first(self) -> Option<ZeroShotResponse> {
        match self {
            ResponseBody::Single(r) => Some(r),
            ResponseBody::Batch(list) => list.into_iter().next(),
        }
    }
}

/// Map a candidate label to its classification
pub fn map_label(label: &str) -> Option<Classification> {
    match label {
        "On Time" => Some(Classification::OnTime),
        "Delivered" => Some(Classification::Delivered),
        "Delayed" => Some(Classification::Delayed(DelayReason::Other)),
        "Customs Issue" => Some(Classification::Delayed(DelayReason::Customs)),
        "Weather Delay" => Some(Classification::Delayed(DelayReason::Weather)),
        "Port Congestion" => Some(Classification::Delayed(DelayReason::PortCongestion)),
        _ => None,
    }
}

/// Pick the winning label, rejecting weak or ambiguous answers
pub fn interpret(
    response: &ZeroShotResponse,
    confidence_floor: f64,
) -> Result<Classification, InferenceError> {
    let mut ranked: Vec<(&str, f64)> = response
        .labels
        .iter()
        .map(String::as_str)
        .zip(response.scores.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (label, top) = *ranked.first().ok_or(InferenceError::Empty)?;
    if !(top >= confidence_floor) {
        return Err(InferenceError::LowConfidence {
            score: top,
            floor: confidence_floor,
        });
    }
    if let Some((_, second)) = ranked.get(1) {
        if (top - second).abs() < TIE_EPSILON {
            return Err(InferenceError::Ambiguous(top));
        }
    }

    map_label(label).ok_or_else(|| InferenceError::UnknownLabel(label.to_string()))
}

pub struct HuggingFaceClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    url: String,
    api_key: String,
    confidence_floor: f64,
}

impl HuggingFaceClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(InferenceError::MissingApiKey)?
            .to_string();

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            url: config.url.clone(),
            api_key,
            confidence_floor: config.confidence_floor,
        })
    }
}

#[async_trait]
impl InferenceClient for HuggingFaceClient {
    async fn classify(&self, text: &str) -> Result<Classification, InferenceError> {
        self.rate_limiter.until_ready().await;

        let request = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParameters {
                candidate_labels: CANDIDATE_LABELS,
            },
        };

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(status.as_u16(), error_text));
        }

        let body: ResponseBody = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;
        let body = body.into_first().ok_or(InferenceError::Empty)?;

        let classification = interpret(&body, self.confidence_floor)?;
        tracing::debug!(
            label = body.labels.first().map(String::as_str).unwrap_or(""),
            classification = %classification,
            "Inference result"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(pairs: &[(&str, f64)]) -> ZeroShotResponse {
        ZeroShotResponse {
            sequence: Some("text".to_string()),
            labels: pairs.iter().map(|(l, _)| l.to_string()).collect(),
            scores: pairs.iter().map(|(_, s)| *s).collect(),
        }
    }

    #[test]
    fn test_label_mapping() {
        for label in CANDIDATE_LABELS {
            assert!(map_label(label).is_some(), "{} unmapped", label);
        }
        assert_eq!(map_label("Delayed"), Some(Classification::Delayed(DelayReason::Other)));
        assert_eq!(map_label("Lost at sea"), None);
    }

    #[test]
    fn test_interpret_picks_highest_score() {
        let r = response(&[("On Time", 0.1), ("Port Congestion", 0.7), ("Delayed", 0.2)]);
        assert_eq!(
            interpret(&r, 0.3).unwrap(),
            Classification::Delayed(DelayReason::PortCongestion)
        );
    }

    #[test]
    fn test_interpret_rejects_weak_answers() {
        assert!(matches!(interpret(&response(&[]), 0.3), Err(InferenceError::Empty)));
        assert!(matches!(
            interpret(&response(&[("Delivered", 0.2), ("On Time", 0.1)]), 0.3),
            Err(InferenceError::LowConfidence { .. })
        ));
        assert!(matches!(
            interpret(&response(&[("Delivered", 0.45), ("On Time", 0.45)]), 0.3),
            Err(InferenceError::Ambiguous(_))
        ));
        assert!(matches!(
            interpret(&response(&[("Shipwrecked", 0.9)]), 0.3),
            Err(InferenceError::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_response_shapes() {
        let answer = r#"{"sequence":"s","labels":["Delivered"],"scores":[0.9]}"#;
        let single: ResponseBody = serde_json::from_str(answer).unwrap();
        let batch: ResponseBody = serde_json::from_str(&format!("[{}]", answer)).unwrap();
        assert_eq!(single.into_first().unwrap().labels, vec!["Delivered"]);
        assert_eq!(batch.into_first().unwrap().scores, vec![0.9]);
    }

    #[test]
    fn test_client_requires_key() {
        let config = ClassifierConfig::default();
        assert!(matches!(HuggingFaceClient::new(&config), Err(InferenceError::MissingApiKey)));

        let config = ClassifierConfig {
            api_key: Some("hf_test".to_string()),
            ..ClassifierConfig::default()
        };
        assert!(HuggingFaceClient::new(&config).is_ok());
    }
}
