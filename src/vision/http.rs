//! HTTP 视觉服务客户端
//!
//! 服务端接口：
//! - `GET  {base}/persona` → `{"persona": "..."}`
//! - `PUT  {base}/persona` ← `{"persona": "..."}`
//! - `POST {base}/chat`    ← `{"model", "messages", "image"?, "max_tokens"}` → `{"response": "..."}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::VisionError;
use crate::vision::{CachedFrame, Message, PersonaToken, VisionClient};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize, Deserialize)]
struct PersonaBody {
    persona: PersonaToken,
}

#[derive(Clone)]
pub struct HttpVisionClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpVisionClient {
    pub fn new(base_url: &str, model: &str, request_timeout: Duration) -> Result<Self, VisionError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        })
    }

    /// 可选 Bearer Token（未设置时读取 VISION_API_KEY 环境变量）
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.or_else(|| std::env::var("VISION_API_KEY").ok());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, VisionError> {
        if !response.status().is_success() {
            return Err(VisionError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn chat(
        &self,
        messages: &[Message],
        image: Option<&CachedFrame>,
        max_tokens: u32,
    ) -> Result<String, VisionError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            image: image.map(CachedFrame::to_data_url),
            max_tokens,
        };
        let response = self
            .request(reqwest::Method::POST, "/chat")
            .json(&body)
            .send()
            .await?;
        let parsed: ChatResponse = Self::check(response)?.json().await?;
        Ok(parsed.response)
    }

    async fn get_persona(&self) -> Result<PersonaToken, VisionError> {
        let response = self.request(reqwest::Method::GET, "/persona").send().await?;
        let parsed: PersonaBody = Self::check(response)?.json().await?;
        Ok(parsed.persona)
    }

    async fn set_persona(&self, persona: &PersonaToken) -> Result<(), VisionError> {
        let response = self
            .request(reqwest::Method::PUT, "/persona")
            .json(&PersonaBody {
                persona: persona.clone(),
            })
            .send()
            .await?;
        Self::check(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![Message::user("what is this?")];
        let body = ChatRequest {
            model: "vlm",
            messages: &messages,
            image: None,
            max_tokens: 128,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "vlm");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_persona_body_is_plain_string() {
        let body: PersonaBody = serde_json::from_str(r#"{"persona": "coach"}"#).unwrap();
        assert_eq!(body.persona.as_str(), "coach");
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = HttpVisionClient::new("http://localhost:8080/", "vlm", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_error() {
        // 端口 9 (discard) 在测试环境中通常不可连接
        let client = HttpVisionClient::new("http://127.0.0.1:9", "vlm", Duration::from_millis(500)).unwrap();
        assert!(client.get_persona().await.is_err());
    }
}
