use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 1;

/// Google Gemini backend over the `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: String, model: String, max_output_tokens: u32, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_output_tokens,
            temperature,
        }
    }

    /// Point at a different endpoint (self-hosted proxy or test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_request(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system, contents) = split_messages(messages);
        let body = RequestBody {
            contents: &contents,
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            {
                if attempt == MAX_RETRIES {
                    return Err(LlmError::RateLimited);
                }
                let delay = retry_delay(&response, attempt);
                tracing::warn!(
                    "Gemini rate limited, retrying in {}s (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let text = response.text().await.map_err(LlmError::Http)?;

            if !status.is_success() {
                tracing::error!("Gemini API error {status}: {text}");
                return Err(LlmError::Other(format!(
                    "Gemini API request failed (status {status})"
                )));
            }

            let resp: ApiResponse = serde_json::from_str(&text)?;
            return resp
                .candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.content.parts.into_iter().next())
                .map(|part| part.text)
                .filter(|text| !text.is_empty())
                .ok_or(LlmError::EmptyResponse { provider: "gemini" });
        }

        Err(LlmError::RateLimited)
    }
}

impl LlmProvider for GeminiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.send_request(messages).await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    Duration::from_secs(BASE_BACKOFF_SECS << attempt)
}

/// Gemini has no system role; system messages become `systemInstruction`
/// and assistant turns map to the `model` role.
fn split_messages(messages: &[Message]) -> (Option<String>, Vec<Content>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.clone()),
            Role::User => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, contents)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    contents: &'a [Content],
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new("test-key".into(), "gemini-2.0-flash".into(), 1024, 0.2)
            .with_base_url(base_url)
    }

    fn candidate_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": text}]
                }
            }]
        })
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = GeminiProvider::new("sk-secret".into(), "gemini-2.0-flash".into(), 512, 0.2);
        let debug_output = format!("{provider:?}");
        assert!(!debug_output.contains("sk-secret"));
        assert!(debug_output.contains("<redacted>"));
        assert!(debug_output.contains("gemini-2.0-flash"));
    }

    #[test]
    fn split_messages_extracts_system_instruction() {
        let messages = vec![
            Message::system("You translate requests."),
            Message::user("list files"),
            Message::assistant("ls"),
        ];
        let (system, contents) = split_messages(&messages);
        assert_eq!(system.unwrap(), "You translate requests.");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn split_messages_joins_multiple_system() {
        let messages = vec![
            Message::system("Part 1"),
            Message::system("Part 2"),
            Message::user("hi"),
        ];
        let (system, _) = split_messages(&messages);
        assert_eq!(system.unwrap(), "Part 1\n\nPart 2");
    }

    #[test]
    fn request_body_omits_missing_system() {
        let body = RequestBody {
            contents: &[],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 256,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("systemInstruction"));
        assert!(json.contains("\"maxOutputTokens\":256"));
    }

    #[tokio::test]
    async fn chat_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("ls -la")))
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let reply = provider.chat(&[Message::user("list files")]).await.unwrap();
        assert_eq!(reply, "ls -la");
    }

    #[tokio::test]
    async fn empty_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let err = provider.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "gemini" }));
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let err = provider.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("pwd")))
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let reply = provider.chat(&[Message::user("where am i")]).await.unwrap();
        assert_eq!(reply, "pwd");
    }

    #[tokio::test]
    async fn chat_with_unreachable_endpoint_errors() {
        let provider = provider("http://127.0.0.1:1");
        let result = provider.chat(&[Message::user("test")]).await;
        assert!(result.is_err());
    }

    #[test]
    fn name_returns_gemini() {
        let provider = GeminiProvider::new("k".into(), "gemini-2.0-flash".into(), 1024, 0.2);
        assert_eq!(provider.name(), "gemini");
    }
}
