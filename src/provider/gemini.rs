//! Gemini REST implementation of [`ModelApi`].
//!
//! Speaks the v1beta API directly: `cachedContents` for cache
//! create/retrieve, `models/{model}:generateContent` with a `cachedContent`
//! reference for answers, and `models/{model}:countTokens` for exact counts.
//!
//! Auth priority: config key → GEMINI_API_KEY → GOOGLE_API_KEY.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{ChatError, Result};

use super::{CacheHandle, ModelApi, PromptRole, PromptTurn};

/// Gemini v1beta REST API base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-001";

/// Display name attached to the created cache resource.
const CACHE_DISPLAY_NAME: &str = "pdf_document_cache";

// ── Auth ─────────────────────────────────────────────────────────────────────

/// API-key authentication, sent as a `?key=` query parameter.
pub struct GeminiAuth {
    key: String,
}

impl std::fmt::Debug for GeminiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GeminiAuth([REDACTED])")
    }
}

impl GeminiAuth {
    /// Resolve an API key in priority order: explicit config value, then
    /// `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn resolve(explicit_key: Option<&str>) -> Option<Self> {
        if let Some(k) = explicit_key.filter(|k| !k.is_empty()) {
            return Some(Self { key: k.to_string() });
        }
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
            .map(|key| Self { key })
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Gemini REST client.
#[derive(Debug)]
pub struct GeminiClient {
    auth: GeminiAuth,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Build a client with an explicit API key.
    pub fn new_with_key(api_key: &str, model: &str) -> Self {
        Self {
            auth: GeminiAuth {
                key: api_key.to_string(),
            },
            model: model.to_string(),
            client: build_http_client(),
        }
    }

    /// Build from an optional configured key, falling back to the
    /// environment. Errors when no key is available anywhere.
    pub fn from_config(api_key: Option<&str>, model: &str) -> Result<Self> {
        let auth = GeminiAuth::resolve(api_key).ok_or_else(|| {
            ChatError::Config(
                "no Gemini API key: set GEMINI_API_KEY (or GOOGLE_API_KEY) or add one to the config file".into(),
            )
        })?;
        Ok(Self {
            auth,
            model: model.to_string(),
            client: build_http_client(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", GEMINI_API_BASE, path)
    }

    /// Send a request with the API key attached and parse the JSON body,
    /// mapping non-2xx responses to a `ChatError::Provider` carrying the
    /// service's `error.message` when one is present.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .query(&[("key", self.auth.key.as_str())])
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Gemini request failed: {}", e)))?;

        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| ChatError::Provider(format!("failed to parse Gemini response: {}", e)));
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Provider(extract_error_message(status, &body)))
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

// ── Request bodies ───────────────────────────────────────────────────────────
//
// Pure builders, unit-tested without a network.

/// Body for `POST /cachedContents`.
fn build_cache_body(
    model: &str,
    preamble: &str,
    pdf_base64: &str,
    system_instruction: &str,
    ttl: Duration,
) -> Value {
    json!({
        "model": format!("models/{}", model),
        "displayName": CACHE_DISPLAY_NAME,
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{
            "role": "user",
            "parts": [
                { "text": preamble },
                { "inline_data": { "mime_type": "application/pdf", "data": pdf_base64 } }
            ]
        }],
        "ttl": format_ttl(ttl),
    })
}

/// Body for `POST /models/{model}:generateContent` against a cache.
fn build_generate_body(cache_name: &str, turns: &[PromptTurn]) -> Value {
    let contents: Vec<Value> = turns
        .iter()
        .map(|t| {
            let role = match t.role {
                PromptRole::User => "user",
                PromptRole::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": &t.text }] })
        })
        .collect();
    json!({
        "cachedContent": cache_name,
        "contents": contents,
    })
}

/// Body for `POST /models/{model}:countTokens`.
fn build_count_body(text: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": text }] }]
    })
}

/// The API expects TTL as a decimal-seconds string, e.g. `"600s"`.
fn format_ttl(ttl: Duration) -> String {
    format!("{}s", ttl.as_secs())
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// Pull a [`CacheHandle`] out of a `cachedContents` resource body.
fn parse_cache_resource(body: &Value, fallback_model: &str) -> Result<CacheHandle> {
    let name = body["name"]
        .as_str()
        .ok_or_else(|| ChatError::Provider("cache response missing resource name".into()))?;
    let model = body["model"]
        .as_str()
        .map(|m| m.trim_start_matches("models/").to_string())
        .unwrap_or_else(|| fallback_model.to_string());
    Ok(CacheHandle {
        name: name.to_string(),
        model,
    })
}

/// Join the text parts of the first candidate. `None` when the response has
/// no text at all.
fn extract_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let texts: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(""))
    }
}

/// Prefer the structured `error.message` field of a failure body; fall back
/// to the raw body text.
fn extract_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .map(|m| format!("Gemini API error ({}): {}", status, m))
        })
        .unwrap_or_else(|| format!("Gemini API error ({}): {}", status, body))
}

// ── ModelApi ─────────────────────────────────────────────────────────────────

#[async_trait]
impl ModelApi for GeminiClient {
    async fn create_cache(
        &self,
        pdf_bytes: &[u8],
        preamble: &str,
        system_instruction: &str,
        ttl: Duration,
    ) -> Result<CacheHandle> {
        let pdf_base64 = base64::engine::general_purpose::STANDARD.encode(pdf_bytes);
        let body = build_cache_body(&self.model, preamble, &pdf_base64, system_instruction, ttl);
        debug!(model = %self.model, ttl = %format_ttl(ttl), "creating Gemini content cache");
        let response = self
            .send(self.client.post(self.url("cachedContents")).json(&body))
            .await?;
        parse_cache_resource(&response, &self.model)
    }

    async fn get_cache(&self, name: &str) -> Result<CacheHandle> {
        // `name` is the full resource path, e.g. "cachedContents/abc123".
        let response = self.send(self.client.get(self.url(name))).await?;
        parse_cache_resource(&response, &self.model)
    }

    async fn generate_content(&self, cache: &CacheHandle, turns: &[PromptTurn]) -> Result<String> {
        let body = build_generate_body(&cache.name, turns);
        let path = format!("models/{}:generateContent", cache.model);
        debug!(cache = %cache.name, turns = turns.len(), "generating against cache");
        let response = self.send(self.client.post(self.url(&path)).json(&body)).await?;
        extract_text(&response)
            .ok_or_else(|| ChatError::Provider("Gemini response contained no text".into()))
    }

    async fn count_tokens(&self, text: &str) -> Result<u64> {
        let body = build_count_body(text);
        let path = format!("models/{}:countTokens", self.model);
        let response = self.send(self.client.post(self.url(&path)).json(&body)).await?;
        response["totalTokens"]
            .as_u64()
            .ok_or_else(|| ChatError::Provider("countTokens response missing totalTokens".into()))
    }
}
