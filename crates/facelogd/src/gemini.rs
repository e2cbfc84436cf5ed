//! Recognition client for the Gemini `generateContent` REST endpoint.
//!
//! The target frame and the reference photos are sent inline in one
//! request; the model is asked for a JSON answer matching
//! [`RecognitionResult`]. Any failure on the way resolves to a non-match.

use async_trait::async_trait;
use base64::Engine as _;
use facelog_core::{RecognitionRequest, RecognitionResult, Recognizer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const SYSTEM_INSTRUCTION: &str = "You are a biometric security AI. Compare the first image \
(Target) with subsequent reference images. If a face matches a reference with high confidence \
(>0.7), return the ID. If no match, set matchFound to false. Always estimate demographics.";

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("response has no text part")]
    EmptyResponse,
    #[error("malformed result: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_base: &str,
        model: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            api_base.trim_end_matches('/'),
            model
        );
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }

    async fn call(&self, request: &RecognitionRequest) -> Result<RecognitionResult, RecognitionError> {
        let body = build_body(request);
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Status { status, body });
        }

        let payload: GenerateContentResponse = response.json().await?;
        parse_result(payload)
    }
}

#[async_trait]
impl Recognizer for GeminiClient {
    async fn identify(&self, request: RecognitionRequest) -> RecognitionResult {
        let references = request.references.len();
        match self.call(&request).await {
            Ok(result) => {
                tracing::debug!(
                    references,
                    match_found = result.match_found,
                    confidence = result.confidence,
                    "recognition response"
                );
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, references, "recognition failed; treating as no match");
                RecognitionResult::no_match()
            }
        }
    }
}

/// Build the `generateContent` body: target image, prompt, then references.
pub fn build_body(request: &RecognitionRequest) -> Value {
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut parts = vec![inline_jpeg(b64.encode(&request.target_jpeg))];
    parts.push(json!({ "text": build_prompt(request) }));
    for reference in &request.references {
        parts.push(inline_jpeg(reference.image_base64.clone()));
    }

    json!({
        "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "matchFound": { "type": "BOOLEAN" },
                    "matchId": { "type": "STRING" },
                    "confidence": { "type": "NUMBER" },
                    "demographics": {
                        "type": "OBJECT",
                        "properties": {
                            "age_range": { "type": "STRING" },
                            "gender": { "type": "STRING" },
                            "expression": { "type": "STRING" }
                        }
                    }
                },
                "required": ["matchFound", "confidence"]
            }
        }
    })
}

fn inline_jpeg(data: String) -> Value {
    json!({ "inlineData": { "mimeType": "image/jpeg", "data": data } })
}

fn build_prompt(request: &RecognitionRequest) -> String {
    let mut prompt = format!(
        "Analyze the first image (the 'Target'). Compare it against the following {} reference images.",
        request.references.len()
    );
    if request.references.is_empty() {
        prompt.push_str("\nNo reference images provided. Just analyze demographics.");
    } else {
        prompt.push_str("\nReference Mapping:");
        for (i, reference) in request.references.iter().enumerate() {
            prompt.push_str(&format!("\n- Reference Image {}: ID \"{}\"", i + 1, reference.id));
        }
    }
    prompt
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Pull the JSON answer out of the first candidate's first text part.
pub fn parse_result(payload: GenerateContentResponse) -> Result<RecognitionResult, RecognitionError> {
    let text = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|content| content.parts.into_iter().find_map(|p| p.text))
        .filter(|t| !t.trim().is_empty())
        .ok_or(RecognitionError::EmptyResponse)?;

    let result: RecognitionResult = serde_json::from_str(text.trim())?;
    Ok(result.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelog_core::ReferenceImage;

    fn request(n: usize) -> RecognitionRequest {
        RecognitionRequest {
            target_jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            references: (0..n)
                .map(|i| ReferenceImage {
                    id: format!("user-{i}"),
                    image_base64: format!("REF{i}"),
                })
                .collect(),
        }
    }

    fn payload(text: &str) -> GenerateContentResponse {
        serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        }))
        .unwrap()
    }

    #[test]
    fn test_body_part_order() {
        let body = build_body(&request(2));
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/2Q==");
        let prompt = parts[1]["text"].as_str().unwrap();
        assert!(prompt.contains("following 2 reference images"));
        assert!(prompt.contains("- Reference Image 1: ID \"user-0\""));
        assert!(prompt.contains("- Reference Image 2: ID \"user-1\""));
        assert_eq!(parts[2]["inlineData"]["data"], "REF0");
        assert_eq!(parts[3]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"],
            json!(["matchFound", "confidence"])
        );
    }

    #[test]
    fn test_prompt_without_references() {
        let body = build_body(&request(0));
        let prompt = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert!(prompt.contains("Just analyze demographics"));
    }

    #[test]
    fn test_parse_result() {
        let result = parse_result(payload(
            r#"{"matchFound":true,"matchId":"u1","confidence":0.93,"demographics":{"expression":"smiling"}}"#,
        ))
        .unwrap();
        assert!(result.match_found);
        assert_eq!(result.match_id.as_deref(), Some("u1"));
        assert_eq!(result.expression(), Some("smiling"));
    }

    #[test]
    fn test_parse_result_clamps_confidence() {
        let result = parse_result(payload(r#"{"matchFound":true,"matchId":"u1","confidence":93}"#)).unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_parse_result_malformed() {
        assert!(matches!(
            parse_result(payload("I think it is user 1")),
            Err(RecognitionError::Malformed(_))
        ));
        assert!(matches!(
            parse_result(payload(r#"{"matchId":"u1"}"#)),
            Err(RecognitionError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_result_no_candidates() {
        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(parse_result(empty), Err(RecognitionError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_transport_error_degrades_to_no_match() {
        // Nothing listens on port 1.
        let client =
            GeminiClient::new("http://127.0.0.1:1", "test-model", "key", Duration::from_secs(2))
                .unwrap();
        let result = client.identify(request(1)).await;
        assert_eq!(result, RecognitionResult::no_match());
    }

    #[test]
    fn test_endpoint_format() {
        let client = GeminiClient::new(
            "https://example.invalid/",
            "gemini-2.5-flash",
            "k",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint,
            "https://example.invalid/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
