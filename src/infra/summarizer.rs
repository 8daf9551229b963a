//! HTTP client for a hosted summarization model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::application::summarizer::{Summarizer, SummarizerError};
use crate::config::SummarizerSettings;
use crate::infra::error::InfraError;

pub const EMPTY_SUMMARY_FALLBACK: &str = "No summary generated.";

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    inputs: &'a str,
    parameters: SummarizeParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct SummarizeParameters {
    max_length: u32,
    min_length: u32,
    do_sample: bool,
}

#[derive(Debug, Deserialize)]
struct SummaryCandidate {
    #[serde(default)]
    summary_text: Option<String>,
}

pub struct HttpSummarizer {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
    parameters: SummarizeParameters,
}

impl HttpSummarizer {
    pub fn new(settings: &SummarizerSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("scriptorium/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_seconds.get()))
            .build()
            .map_err(|err| InfraError::summarizer(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_token: settings.api_token.clone(),
            parameters: SummarizeParameters {
                max_length: settings.max_length,
                min_length: settings.min_length,
                do_sample: false,
            },
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        let body = SummarizeRequest {
            inputs: text,
            parameters: self.parameters,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SummarizerError::Request(err.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SummarizerError::Request(err.to_string()))?;

        if !status.is_success() {
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let summary = decode_summary(&bytes)?;
        debug!(
            target = "infra::summarizer",
            input_chars = text.chars().count(),
            summary_chars = summary.chars().count(),
            "summary received"
        );
        Ok(summary)
    }
}

/// Extract the first candidate's text from a `[{"summary_text": ...}]` body.
fn decode_summary(bytes: &[u8]) -> Result<String, SummarizerError> {
    let candidates: Vec<SummaryCandidate> =
        serde_json::from_slice(bytes).map_err(|err| SummarizerError::Decode(err.to_string()))?;

    let summary = candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.summary_text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    Ok(summary.unwrap_or_else(|| EMPTY_SUMMARY_FALLBACK.to_string()))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use serde_json::json;

    use super::*;

    fn settings() -> SummarizerSettings {
        SummarizerSettings {
            endpoint: Url::parse("http://127.0.0.1:9/summarize").expect("url"),
            api_token: Some("secret".into()),
            timeout_seconds: NonZeroU64::new(5).expect("non-zero"),
            max_length: 100,
            min_length: 50,
        }
    }

    #[test]
    fn request_body_disables_sampling() {
        let body = SummarizeRequest {
            inputs: "Some long article text.",
            parameters: SummarizeParameters {
                max_length: 100,
                min_length: 50,
                do_sample: false,
            },
        };
        let value = serde_json::to_value(&body).expect("json");
        assert_eq!(
            value,
            json!({
                "inputs": "Some long article text.",
                "parameters": {"max_length": 100, "min_length": 50, "do_sample": false}
            })
        );
    }

    #[test]
    fn decodes_first_candidate() {
        let body = br#"[{"summary_text":"  First.  "},{"summary_text":"Second."}]"#;
        assert_eq!(decode_summary(body).expect("summary"), "First.");
    }

    #[test]
    fn empty_output_falls_back() {
        assert_eq!(decode_summary(b"[]").expect("summary"), EMPTY_SUMMARY_FALLBACK);
        assert_eq!(
            decode_summary(br#"[{"summary_text":""}]"#).expect("summary"),
            EMPTY_SUMMARY_FALLBACK
        );
        assert_eq!(decode_summary(b"[{}]").expect("summary"), EMPTY_SUMMARY_FALLBACK);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode_summary(br#"{"error":"model loading"}"#).expect_err("decode");
        assert!(matches!(err, SummarizerError::Decode(_)));
    }

    #[test]
    fn client_keeps_configured_endpoint() {
        let summarizer = HttpSummarizer::new(&settings()).expect("client");
        assert_eq!(summarizer.endpoint().path(), "/summarize");
        assert_eq!(summarizer.parameters.max_length, 100);
        assert!(!summarizer.parameters.do_sample);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_error() {
        let summarizer = HttpSummarizer::new(&settings()).expect("client");
        let err = summarizer.summarize("text").await.expect_err("no server");
        assert!(matches!(err, SummarizerError::Request(_)));
    }
}
