//! SDK 配置

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QueryChannelsError, Result};
use crate::pagination::{DEFAULT_CHANNEL_LIMIT, DEFAULT_MESSAGE_LIMIT};

/// 查询频道 SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryChannelsConfig {
    /// 数据存储目录（SQLite 与 sled 都放在这里）
    pub data_dir: PathBuf,
    /// 是否启用离线存储；关闭时只使用内存存储
    pub offline_enabled: bool,
    /// 查询时是否携带用户在线状态（原样透传给服务端）
    pub user_presence: bool,
    /// 默认每页频道数
    pub channel_limit: u32,
    /// 默认每个频道携带的消息数
    pub message_limit: u32,
    /// 事件广播容量
    pub event_capacity: usize,
    /// 远端查询 API 基础 URL，例如 https://chat.example.com/api
    pub api_base_url: Option<String>,
    /// HTTP 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for QueryChannelsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./querychannels_data"),
            offline_enabled: true,
            user_presence: false,
            channel_limit: DEFAULT_CHANNEL_LIMIT,
            message_limit: DEFAULT_MESSAGE_LIMIT,
            event_capacity: 1000,
            api_base_url: None,
            request_timeout_secs: Some(30),
        }
    }
}

impl QueryChannelsConfig {
    pub fn builder() -> QueryChannelsConfigBuilder {
        QueryChannelsConfigBuilder::new()
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.channel_limit == 0 {
            return Err(QueryChannelsError::Config("channel_limit 必须大于 0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(QueryChannelsError::Config("event_capacity 必须大于 0".to_string()));
        }
        if let Some(url) = &self.api_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(QueryChannelsError::Config(format!("无效的 api_base_url: {}", url)));
            }
        }
        Ok(())
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("channels.db")
    }

    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join("kv")
    }
}

pub struct QueryChannelsConfigBuilder {
    config: QueryChannelsConfig,
}

impl QueryChannelsConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QueryChannelsConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn offline_enabled(mut self, enabled: bool) -> Self {
        self.config.offline_enabled = enabled;
        self
    }

    pub fn user_presence(mut self, presence: bool) -> Self {
        self.config.user_presence = presence;
        self
    }

    pub fn channel_limit(mut self, limit: u32) -> Self {
        self.config.channel_limit = limit;
        self
    }

    pub fn message_limit(mut self, limit: u32) -> Self {
        self.config.message_limit = limit;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> QueryChannelsConfig {
        self.config
    }
}

impl Default for QueryChannelsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
