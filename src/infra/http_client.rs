use crate::app::ports::{HttpClientPort, HttpGetResult};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};

pub struct ReqwestHttp {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestHttp {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult, String> {
        tracing::debug!("HTTP GET request to: {}", url);
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        tracing::debug!("HTTP response: status={}, size={} bytes", status, bytes.len());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let content_length: u64 = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(bytes.len() as u64);
        Ok(HttpGetResult { status, bytes, content_type, content_length })
    }
}
