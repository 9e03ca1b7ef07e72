use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use stylist_contracts::closet::ImageAsset;
use stylist_contracts::errors::StylistError;
use stylist_contracts::models::ModelId;

use crate::config::StylistConfig;

pub const CLOSET_PREAMBLE: &str = "Closet contents:";
const USER_REQUEST_PREFIX: &str = "User Request: ";
const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Everything one stylist turn sends to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: ModelId,
    /// Name the transport should put on the wire.
    pub transport_model: String,
    pub system_instruction: String,
    pub images: Vec<ImageAsset>,
    pub user_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

impl GenerationResponse {
    pub fn text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            input_tokens: None,
            output_tokens: None,
        }
    }
}

/// Remote multimodal text generation. Implementations own their transport,
/// timeouts and error wording; callers only see `StylistError::Generation`.
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, StylistError>;
}

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &StylistConfig) -> Result<Self, StylistError> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key,
            timeout: config.request_timeout,
            http: HttpClient::new(),
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_contents(request: &GenerationRequest) -> Vec<Value> {
        let mut parts = Vec::with_capacity(request.images.len() + 2);
        parts.push(json!({ "text": CLOSET_PREAMBLE }));
        for image in &request.images {
            parts.push(image_part(image));
        }
        parts.push(json!({
            "text": format!("{USER_REQUEST_PREFIX}{}", request.user_text),
        }));
        parts
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }],
            },
            "contents": [{
                "role": "user",
                "parts": Self::build_contents(request),
            }],
        })
    }

    fn extract_text(response_payload: &Value) -> Result<String, StylistError> {
        let candidate = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first());

        let text = candidate
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();
        if !text.trim().is_empty() {
            return Ok(text);
        }

        if let Some(reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(StylistError::generation(format!(
                "Gemini blocked the request ({reason})"
            )));
        }
        match candidate
            .and_then(|candidate| candidate.get("finishReason"))
            .and_then(Value::as_str)
        {
            Some(reason) => Err(StylistError::generation(format!(
                "Gemini returned no text (finish reason {reason})"
            ))),
            None => Err(StylistError::generation("Gemini returned no text")),
        }
    }

    fn usage_tokens(response_payload: &Value) -> (Option<i64>, Option<i64>) {
        let usage = response_payload.get("usageMetadata");
        let count = |key: &str| usage.and_then(|row| row.get(key)).and_then(Value::as_i64);
        (count("promptTokenCount"), count("candidatesTokenCount"))
    }
}

impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, StylistError> {
        let endpoint = self.endpoint_for_model(&request.transport_model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(|err| {
                StylistError::generation(format!(
                    "Gemini request failed ({endpoint}): {}",
                    err.without_url()
                ))
            })?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let text = Self::extract_text(&response_payload)?;
        let (input_tokens, output_tokens) = Self::usage_tokens(&response_payload);
        let model = response_payload
            .get("modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(request.transport_model.as_str())
            .to_string();
        Ok(GenerationResponse {
            text,
            model,
            input_tokens,
            output_tokens,
        })
    }
}

/// Offline client: answers immediately with a reply derived from the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunClient;

impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, StylistError> {
        let names = request
            .images
            .iter()
            .map(ImageAsset::name)
            .collect::<Vec<&str>>()
            .join(", ");
        let text = format!(
            "[dryrun {}] Styling \"{}\" from {} closet photo(s): {}.",
            short_id(request),
            request.user_text.trim(),
            request.images.len(),
            names
        );
        Ok(GenerationResponse::text(text, request.model.as_str()))
    }
}

fn image_part(image: &ImageAsset) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type(),
            "data": BASE64.encode(image.bytes()),
        }
    })
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, StylistError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        StylistError::generation(format!(
            "{provider} response body read failed: {}",
            err.without_url()
        ))
    })?;
    if !status.is_success() {
        return Err(StylistError::generation(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, ERROR_BODY_MAX_CHARS)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        StylistError::generation(format!("{provider} returned invalid JSON payload: {err}"))
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    let value = value.trim();
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn short_id(request: &GenerationRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.user_text.as_bytes());
    hasher.update((request.images.len() as u64).to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

/// Request metadata for the event log; never includes image bytes.
pub(crate) fn request_summary(request: &GenerationRequest) -> Map<String, Value> {
    let images = request
        .images
        .iter()
        .map(|image| {
            json!({
                "name": image.name(),
                "mime_type": image.mime_type(),
                "bytes": image.len(),
            })
        })
        .collect::<Vec<Value>>();
    let mut payload = Map::new();
    payload.insert("model".to_string(), json!(request.model.as_str()));
    payload.insert("transport_model".to_string(), json!(request.transport_model));
    payload.insert("images".to_string(), Value::Array(images));
    payload.insert("user_text".to_string(), json!(request.user_text));
    payload
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use stylist_contracts::closet::ImageFormat;

    use super::*;
    use crate::config::ConfigOverrides;

    fn request_for_test() -> GenerationRequest {
        GenerationRequest {
            model: ModelId::Gemini3Flash,
            transport_model: "gemini-3-flash-preview".to_string(),
            system_instruction: "Be a stylist.".to_string(),
            images: vec![
                ImageAsset::new("blazer.jpg", ImageFormat::Jpeg, b"jpeg-bytes".to_vec(), 1, 1),
                ImageAsset::new("shoes.png", ImageFormat::Png, b"png-bytes".to_vec(), 1, 1),
            ],
            user_text: "Business meeting outfit?".to_string(),
        }
    }

    fn config_for_test(api_base: &str) -> anyhow::Result<StylistConfig> {
        let api_base = api_base.to_string();
        Ok(StylistConfig::from_lookup(
            ConfigOverrides {
                api_key: Some("test-key".to_string()),
                ..ConfigOverrides::default()
            },
            move |key: &str| (key == "GEMINI_API_BASE").then(|| api_base.clone()),
        )?)
    }

    /// Serves exactly one HTTP response and hands back the raw request.
    fn serve_once(status_line: &str, body: &str) -> anyhow::Result<(String, thread::JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base = format!("http://{}/v1beta", listener.local_addr()?);
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return String::new();
            };
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);
            let _ = reader.get_mut().write_all(response.as_bytes());
            head + "\r\n" + &String::from_utf8_lossy(&body)
        });
        Ok((base, handle))
    }

    #[test]
    fn payload_wraps_images_between_preamble_and_request() {
        let payload = GeminiClient::build_payload(&request_for_test());
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            json!("Be a stylist.")
        );
        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], json!("user"));

        let parts = contents[0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["text"], json!("Closet contents:"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(
            parts[1]["inlineData"]["data"],
            json!(BASE64.encode(b"jpeg-bytes"))
        );
        assert_eq!(parts[2]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[3]["text"], json!("User Request: Business meeting outfit?"));
    }

    #[test]
    fn extract_text_joins_parts_and_skips_thoughts() {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Wear the navy blazer"},
                    {"text": " with loafers."}
                ]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GeminiClient::extract_text(&payload),
            Ok("Wear the navy blazer with loafers.".to_string())
        );
    }

    #[test]
    fn extract_text_reports_blocks_and_empty_candidates() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert_eq!(
            GeminiClient::extract_text(&blocked),
            Err(StylistError::generation("Gemini blocked the request (SAFETY)"))
        );

        let truncated = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]});
        assert_eq!(
            GeminiClient::extract_text(&truncated),
            Err(StylistError::generation(
                "Gemini returned no text (finish reason MAX_TOKENS)"
            ))
        );

        assert_eq!(
            GeminiClient::extract_text(&json!({})),
            Err(StylistError::generation("Gemini returned no text"))
        );
    }

    #[test]
    fn client_requires_a_credential() -> anyhow::Result<()> {
        let config = StylistConfig::from_lookup(ConfigOverrides::default(), |_: &str| None)?;
        assert!(matches!(
            GeminiClient::new(&config),
            Err(StylistError::MissingCredential)
        ));
        Ok(())
    }

    #[test]
    fn endpoint_uses_models_path() -> anyhow::Result<()> {
        let client = GeminiClient::new(&config_for_test("https://example.test/v1beta")?)?;
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model("models/gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        Ok(())
    }

    #[test]
    fn generate_posts_to_gemini_and_reads_reply() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "Wear the navy blazer."}]}}],
            "usageMetadata": {"promptTokenCount": 812, "candidatesTokenCount": 9},
            "modelVersion": "gemini-3-flash-preview"
        })
        .to_string();
        let (base, server) = serve_once("200 OK", &body)?;
        let mut client = GeminiClient::new(&config_for_test(&base)?)?;
        client.http = HttpClient::builder().no_proxy().build()?;

        let response = client.generate(&request_for_test())?;
        assert_eq!(response.text, "Wear the navy blazer.");
        assert_eq!(response.model, "gemini-3-flash-preview");
        assert_eq!(response.input_tokens, Some(812));
        assert_eq!(response.output_tokens, Some(9));

        let raw_request = server.join().unwrap_or_default();
        assert!(raw_request
            .starts_with("POST /v1beta/models/gemini-3-flash-preview:generateContent HTTP/1.1"));
        assert!(raw_request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(raw_request.contains("User Request: Business meeting outfit?"));
        assert!(!raw_request.contains("key=test-key"));
        Ok(())
    }

    #[test]
    fn generate_surfaces_http_errors_opaquely() -> anyhow::Result<()> {
        let (base, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"Resource has been exhausted"}}"#,
        )?;
        let mut client = GeminiClient::new(&config_for_test(&base)?)?;
        client.http = HttpClient::builder().no_proxy().build()?;

        let err = client.generate(&request_for_test()).err();
        let _ = server.join();
        assert_eq!(
            err,
            Some(StylistError::generation(
                r#"Gemini request failed (429): {"error":{"message":"Resource has been exhausted"}}"#
            ))
        );
        Ok(())
    }

    #[test]
    fn dryrun_reply_is_deterministic() -> anyhow::Result<()> {
        let request = request_for_test();
        let first = DryrunClient.generate(&request)?;
        let second = DryrunClient.generate(&request)?;
        assert_eq!(first, second);
        assert!(first.text.starts_with("[dryrun "));
        assert!(first
            .text
            .ends_with("Styling \"Business meeting outfit?\" from 2 closet photo(s): blazer.jpg, shoes.png."));
        assert_eq!(first.model, "gemini-3-flash");
        Ok(())
    }

    #[test]
    fn request_summary_omits_image_bytes() {
        let summary = request_summary(&request_for_test());
        assert_eq!(summary["images"][0]["bytes"], json!(10));
        assert_eq!(summary["images"][1]["name"], json!("shoes.png"));
        assert!(!Value::Object(summary).to_string().contains(&BASE64.encode(b"png-bytes")));
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("  short  ", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
