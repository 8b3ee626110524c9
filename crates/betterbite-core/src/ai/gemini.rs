use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prompt::{system_instruction, task_prompt};
use super::AnalysisService;
use crate::analysis::{parse_analysis, Analysis};
use crate::error::AnalysisError;
use crate::imaging::{strip_transport_prefix, JPEG_MIME};
use crate::mode::ScanMode;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn jpeg(encoded: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: JPEG_MIME.to_string(),
                data: strip_transport_prefix(encoded).to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

fn build_request(images: &[String], mode: ScanMode) -> Result<GeminiRequest, AnalysisError> {
    if images.is_empty() || images.len() > mode.max_shots() {
        return Err(AnalysisError::new(format!(
            "{} mode takes 1-{} images, got {}",
            mode.as_str(),
            mode.max_shots(),
            images.len()
        )));
    }

    let mut parts: Vec<GeminiPart> = images.iter().map(|img| GeminiPart::jpeg(img)).collect();
    parts.push(GeminiPart::text(task_prompt(mode)));

    Ok(GeminiRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(system_instruction(mode))],
        },
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
        },
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: category.to_string(),
                threshold: "BLOCK_NONE".to_string(),
            })
            .collect(),
    })
}

/// Concatenated text of the first candidate
fn response_text(response: GeminiResponse) -> Result<String, AnalysisError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::new(format!("request blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::new("model returned no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::new(format!(
            "model returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Send one generateContent request and return the raw model text
    pub async fn generate(&self, images: &[String], mode: ScanMode) -> Result<String, AnalysisError> {
        let request = build_request(images, mode)?;
        debug!(model = %self.model, mode = mode.as_str(), images = images.len(), "sending analysis request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "Gemini API error");
            return Err(AnalysisError::new(format!("Gemini API error {}: {}", status, text)));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        response_text(gemini_response)
    }
}

#[async_trait]
impl AnalysisService for GeminiClient {
    async fn analyze(&self, images: &[String], mode: ScanMode) -> Result<Analysis, AnalysisError> {
        let text = self.generate(images, mode).await?;
        parse_analysis(&text, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_request_strips_prefix_and_orders_parts() {
        let images = vec![
            "data:image/jpeg;base64,AAAA".to_string(),
            "BBBB".to_string(),
        ];
        let request = build_request(&images, ScanMode::Compare).unwrap();
        let json: Value = serde_json::to_value(&request).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["data"], "AAAA");
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "BBBB");
        assert_eq!(parts[2]["text"], task_prompt(ScanMode::Compare));
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            super::super::prompt::COMPARISON_INSTRUCTION
        );
    }

    #[test]
    fn test_request_is_json_only_and_permissive() {
        let request = build_request(&["AA".to_string()], ScanMode::Scan).unwrap();
        let json: Value = serde_json::to_value(&request).unwrap();

        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        let settings = json["safetySettings"].as_array().unwrap();
        assert_eq!(settings.len(), 4);
        assert!(settings.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_request_rejects_bad_image_counts() {
        assert!(build_request(&[], ScanMode::Scan).is_err());
        let two = vec!["AA".to_string(), "BB".to_string()];
        assert!(build_request(&two, ScanMode::Nutrition).is_err());
        let four = vec!["AA".to_string(); 4];
        assert!(build_request(&four, ScanMode::Compare).is_err());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_response_text_surfaces_blocks_and_empties() {
        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(response_text(blocked).is_err());

        let empty: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(response_text(empty).is_err());

        let no_text: GeminiResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#).unwrap();
        assert!(response_text(no_text).is_err());
    }

    /// Answer a single HTTP request with a canned response, returning the base URL
    async fn serve_once(status: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Drain the request so the client is not reset mid-write
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    fn shot() -> Vec<String> {
        vec!["data:image/jpeg;base64,AAAA".to_string()]
    }

    #[tokio::test]
    async fn test_error_status_becomes_one_analysis_error() {
        let base = serve_once("503 Service Unavailable", r#"{"error": "overloaded"}"#.to_string()).await;
        let client = GeminiClient::new("key").with_base_url(&base);

        let err = client.analyze(&shot(), ScanMode::Scan).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_malformed_body_becomes_one_analysis_error() {
        let base = serve_once("200 OK", "<html>not json</html>".to_string()).await;
        let client = GeminiClient::new("key").with_base_url(&base);

        assert!(client.generate(&shot(), ScanMode::Scan).await.is_err());
    }

    #[tokio::test]
    async fn test_model_text_that_is_not_an_analysis_is_rejected() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot read this label"}]}}]
        });
        let base = serve_once("200 OK", body.to_string()).await;
        let client = GeminiClient::new("key").with_base_url(&base);

        assert!(client.analyze(&shot(), ScanMode::Scan).await.is_err());
    }

    #[tokio::test]
    async fn test_successful_round_trip() {
        let analysis = serde_json::json!({
            "productName": "Rolled Oats",
            "score": 91,
            "explanation": "Single ingredient",
            "pros": ["Whole grain"],
            "cons": [],
            "additives": []
        });
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": analysis.to_string()}]},
                "finishReason": "STOP"
            }]
        });
        let base = serve_once("200 OK", body.to_string()).await;
        let client = GeminiClient::new("key").with_base_url(&base);

        match client.analyze(&shot(), ScanMode::Scan).await.unwrap() {
            Analysis::Single(product) => {
                assert_eq!(product.product_name, "Rolled Oats");
                assert_eq!(product.score, 91);
            }
            other => panic!("unexpected analysis {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::new("key")
            .with_model("gemini-2.5-flash")
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
