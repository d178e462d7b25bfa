//! Response scoring.
//!
//! Two strategies behind one interface: a remote LLM analysis as the primary
//! and a deterministic keyword-overlap classifier as the fallback. Strategy
//! selection is internal; a failing primary degrades the analysis, it never
//! surfaces an error to the session flow.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::services::trick_catalog::{CatalogError, LanguageTrick, TrickCatalog};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

/// Confidence (0..100) at or above which a response counts as correct.
pub const CORRECT_CONFIDENCE: f64 = 30.0;
/// Confidence (0..100) above which a trick is reported as detected.
pub const DETECTION_CONFIDENCE: f64 = 20.0;
/// Responses shorter than this are rejected outright.
pub const MIN_RESPONSE_CHARS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAnalysis {
    pub is_correct: bool,
    /// 0..100.
    pub score: f64,
    pub feedback: String,
    pub improvements: Vec<String>,
    pub detected_trick: Option<String>,
    /// 0..1.
    pub confidence: f64,
    pub fallback_used: bool,
}

#[derive(Debug, Clone)]
pub struct TrickClassification {
    pub detected_trick_id: Option<i32>,
    pub confidence: f64,
    pub explanation: String,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("scoring model not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config: LlmConfig {
                api_key,
                model,
                api_endpoint,
                timeout,
            },
            client,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }

    pub async fn complete_with_system(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(OracleError::NotConfigured("LLM_API_KEY"))?;

        let url = format!(
            "{}/chat/completions",
            self.config.api_endpoint.trim_end_matches('/')
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(OracleError::EmptyChoices)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, OracleError> {
        let mut last_error: Option<OracleError> = None;

        for retry in 0..=MAX_RETRIES {
            match self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(OracleError::Json);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = OracleError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "Scoring model request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = OracleError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "Scoring model request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(OracleError::EmptyChoices))
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = "You evaluate whether a trainee's reply applies a given \
verbal reframing technique to a statement. Reply with strict JSON only: \
{\"is_correct\": bool, \"score\": number 0-100, \"feedback\": string, \
\"improvements\": [string], \"detected_trick\": string or null}.";

/// Payload shape expected back from the model. Missing fields fall back to
/// defaults rather than failing the whole analysis.
#[derive(Debug, Deserialize)]
struct RemoteAnalysis {
    #[serde(default)]
    is_correct: bool,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    detected_trick: Option<String>,
}

pub struct ScoringOracle {
    llm: LlmClient,
    catalog: Arc<TrickCatalog>,
}

impl ScoringOracle {
    pub fn new(llm: LlmClient, catalog: Arc<TrickCatalog>) -> Self {
        Self { llm, catalog }
    }

    /// Analyze a response against the target trick. Falls back to the local
    /// classifier on any primary failure; only storage errors propagate.
    pub async fn analyze(
        &self,
        response: &str,
        trick: &LanguageTrick,
        statement: &str,
        examples: &[String],
    ) -> Result<ResponseAnalysis, CatalogError> {
        if self.llm.is_available() {
            match self.analyze_remote(response, trick, statement, examples).await {
                Ok(analysis) => return Ok(analysis),
                Err(err) => {
                    warn!(trick_id = trick.id, error = %err, "Remote scoring failed, using local classifier");
                }
            }
        }

        let all_tricks = self.catalog.all_tricks().await?;
        Ok(fallback_analysis(response, trick, &all_tricks))
    }

    async fn analyze_remote(
        &self,
        response: &str,
        trick: &LanguageTrick,
        statement: &str,
        examples: &[String],
    ) -> Result<ResponseAnalysis, OracleError> {
        let user_prompt = build_analysis_prompt(response, trick, statement, examples);
        let raw = self
            .llm
            .complete_with_system(ANALYSIS_SYSTEM_PROMPT, &user_prompt)
            .await?;

        let parsed: RemoteAnalysis = serde_json::from_str(extract_json_block(&raw))?;
        let score = parsed.score.clamp(0.0, 100.0);

        Ok(ResponseAnalysis {
            is_correct: parsed.is_correct,
            score,
            feedback: parsed.feedback,
            improvements: parsed.improvements,
            detected_trick: parsed.detected_trick,
            confidence: score / 100.0,
            fallback_used: false,
        })
    }
}

fn build_analysis_prompt(
    response: &str,
    trick: &LanguageTrick,
    statement: &str,
    examples: &[String],
) -> String {
    let examples_text = examples
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Statement: {statement}\n\
         Technique: {name}\n\
         Definition: {definition}\n\
         Keywords: {keywords}\n\
         Reference examples:\n{examples_text}\n\
         Trainee reply: {response}",
        name = trick.name,
        definition = trick.definition,
        keywords = trick.keywords.join(", "),
    )
}

/// Strips a markdown code fence (```json ... ``` or ``` ... ```) so the
/// payload parses even when the model wraps its JSON.
pub fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn keyword_matches(response_lower: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| response_lower.contains(&k.to_lowercase()))
        .count()
}

/// Keyword-overlap classification: confidence is the matched share of the
/// target trick's keywords, scanning all tricks for a better match.
pub fn classify_response(
    response: &str,
    target: &LanguageTrick,
    all_tricks: &[LanguageTrick],
) -> TrickClassification {
    let response_lower = response.to_lowercase();

    let matches = keyword_matches(&response_lower, &target.keywords);
    let total = target.keywords.len();
    let target_confidence = if total > 0 {
        matches as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut best_id = target.id;
    let mut best_confidence = target_confidence;

    for trick in all_tricks {
        if trick.id == target.id || trick.keywords.is_empty() {
            continue;
        }
        let trick_matches = keyword_matches(&response_lower, &trick.keywords);
        let confidence = trick_matches as f64 / trick.keywords.len() as f64 * 100.0;
        if confidence > best_confidence {
            best_id = trick.id;
            best_confidence = confidence;
        }
    }

    let detected_trick_id = (best_confidence > DETECTION_CONFIDENCE).then_some(best_id);

    let mut explanation = format!("Matched {matches} of {total} keywords for '{}'", target.name);
    if let Some(id) = detected_trick_id {
        if id != target.id {
            if let Some(other) = all_tricks.iter().find(|t| t.id == id) {
                explanation.push_str(&format!(". The reply resembles '{}' instead", other.name));
            }
        }
    }

    TrickClassification {
        detected_trick_id,
        confidence: best_confidence,
        explanation,
    }
}

/// Local analysis used when the remote model is unavailable or unparsable.
pub fn fallback_analysis(
    response: &str,
    target: &LanguageTrick,
    all_tricks: &[LanguageTrick],
) -> ResponseAnalysis {
    if response.trim().chars().count() < MIN_RESPONSE_CHARS {
        return ResponseAnalysis {
            is_correct: false,
            score: 0.0,
            feedback: "The reply is too short to evaluate. Try a full sentence.".to_string(),
            improvements: vec!["Write a complete reframing of the statement".to_string()],
            detected_trick: None,
            confidence: 0.0,
            fallback_used: true,
        };
    }

    let classification = classify_response(response, target, all_tricks);
    let is_correct = classification.confidence >= CORRECT_CONFIDENCE;
    let score = classification.confidence;

    let mut feedback = format!("Scored by the keyword matcher. {}", classification.explanation);
    if !is_correct {
        let hint: Vec<&str> = target.keywords.iter().take(3).map(String::as_str).collect();
        feedback.push_str(&format!(
            ". Try working in keywords of '{}': {}",
            target.name,
            hint.join(", ")
        ));
    }

    ResponseAnalysis {
        is_correct,
        score,
        feedback,
        improvements: vec![
            "Use more of this technique's keywords".to_string(),
            "Study the reference examples before retrying".to_string(),
        ],
        detected_trick: is_correct.then(|| target.name.clone()),
        confidence: score / 100.0,
        fallback_used: true,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn trick(id: i32, name: &str, keywords: &[&str]) -> LanguageTrick {
        LanguageTrick {
            id,
            name: name.to_string(),
            definition: format!("{name} definition"),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            examples: HashMap::new(),
        }
    }

    fn catalog() -> Vec<LanguageTrick> {
        vec![
            trick(1, "Intent", &["intent", "purpose", "really want"]),
            trick(2, "Redefinition", &["in other words", "rather", "call it"]),
        ]
    }

    #[test]
    fn classification_counts_target_keywords() {
        let tricks = catalog();
        let result = classify_response(
            "What you really want here is safety, that purpose matters",
            &tricks[0],
            &tricks,
        );
        assert_eq!(result.detected_trick_id, Some(1));
        assert!(result.confidence > 60.0);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let tricks = catalog();
        let result = classify_response("Your PURPOSE and INTENT are clear", &tricks[0], &tricks);
        assert!(result.confidence > 60.0);
    }

    #[test]
    fn classification_prefers_better_matching_trick() {
        let tricks = catalog();
        let result = classify_response(
            "In other words I'd rather call it caution",
            &tricks[0],
            &tricks,
        );
        assert_eq!(result.detected_trick_id, Some(2));
    }

    #[test]
    fn classification_below_threshold_detects_nothing() {
        let tricks = catalog();
        let result = classify_response("completely unrelated text", &tricks[0], &tricks);
        assert_eq!(result.detected_trick_id, None);
    }

    #[test]
    fn fallback_marks_short_responses_incorrect() {
        let tricks = catalog();
        let analysis = fallback_analysis("ok", &tricks[0], &tricks);
        assert!(!analysis.is_correct);
        assert_eq!(analysis.score, 0.0);
        assert!(analysis.fallback_used);
    }

    #[test]
    fn fallback_scores_keyword_rich_responses_correct() {
        let tricks = catalog();
        let analysis = fallback_analysis(
            "What you really want is safety; the purpose and intent behind the rule",
            &tricks[0],
            &tricks,
        );
        assert!(analysis.is_correct);
        assert!(analysis.score >= CORRECT_CONFIDENCE);
        assert_eq!(analysis.detected_trick.as_deref(), Some("Intent"));
    }

    #[test]
    fn fallback_confidence_is_normalized() {
        let tricks = catalog();
        let analysis = fallback_analysis(
            "intent purpose really want",
            &tricks[0],
            &tricks,
        );
        assert!((analysis.confidence - analysis.score / 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn json_block_extraction_handles_fences() {
        assert_eq!(extract_json_block("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json_block("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json_block("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn remote_payload_tolerates_missing_fields() {
        let parsed: RemoteAnalysis = serde_json::from_str("{\"score\": 85}").unwrap();
        assert_eq!(parsed.score, 85.0);
        assert!(!parsed.is_correct);
        assert!(parsed.improvements.is_empty());
    }

    #[test]
    fn endpoint_normalization_appends_v1_once() {
        assert_eq!(
            normalize_endpoint("https://api.example.com".into()),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_endpoint("https://api.example.com/v1/".into()),
            "https://api.example.com/v1"
        );
    }
}
