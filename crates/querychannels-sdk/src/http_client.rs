//! HTTP 查询客户端 - 基于 reqwest 的 QueryChannelsClient 实现
//!
//! POST {api_base_url}/channels，请求体为 QueryChannelsRequest 的 JSON，
//! 响应体为 `{"channels": [...]}`。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::client::QueryChannelsClient;
use crate::config::QueryChannelsConfig;
use crate::error::{QueryChannelsError, Result};
use crate::models::Channel;
use crate::pagination::QueryChannelsRequest;

/// 查询响应
#[derive(Debug, Clone, Deserialize)]
pub struct QueryChannelsResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// HTTP 客户端
pub struct HttpQueryChannelsClient {
    client: Client,
    base_url: String,
}

impl HttpQueryChannelsClient {
    pub fn new(config: &QueryChannelsConfig) -> Result<Self> {
        let base_url = config
            .api_base_url
            .clone()
            .ok_or_else(|| QueryChannelsError::Config("未配置 api_base_url".to_string()))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder
                .connect_timeout(Duration::from_secs(timeout))
                .timeout(Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| QueryChannelsError::Http(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("HTTP 查询客户端已创建 (base_url: {})", base_url);

        Ok(Self { client, base_url })
    }

    fn endpoint(&self) -> String {
        format!("{}/channels", self.base_url)
    }
}

#[async_trait]
impl QueryChannelsClient for HttpQueryChannelsClient {
    async fn query_channels(&self, request: QueryChannelsRequest) -> Result<Vec<Channel>> {
        let url = self.endpoint();
        debug!("查询频道: url={}, offset={}, limit={}", url, request.offset, request.limit);

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("查询频道失败: status={}, body={}", status, body);
            return Err(QueryChannelsError::from_remote(u32::from(status.as_u16()), body));
        }

        let body: QueryChannelsResponse = response.json().await?;
        debug!("查询频道返回 {} 个频道", body.channels.len());
        Ok(body.channels)
    }
}
