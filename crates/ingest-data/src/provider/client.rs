//! 시장 데이터 API JSON 클라이언트.

use std::time::Duration;

use crate::error::{DataError, Result};

/// 얇은 reqwest 래퍼. 재시도와 인증은 하지 않습니다.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET 요청 후 JSON 본문을 반환합니다. 2xx가 아니면 `FetchError`.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(url = %url, params = ?params, "API 요청");

        let response = self
            .client
            .get(&url)
            .query(params)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::FetchError(format!(
                "API 오류 [{}]: {} - {}",
                path, status, body
            )));
        }

        Ok(response.json().await?)
    }
}
