//! 频道领域模型
//!
//! - Channel: 频道完整状态快照（cid = "{channel_type}:{id}"）
//! - ChannelConfig: 按频道类型区分的配置
//! - Message: 频道内的消息（只保留查询列表需要的字段）

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 频道类型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 频道类型名（如 messaging、livestream）
    pub name: String,
    #[serde(default = "default_true")]
    pub typing_events: bool,
    #[serde(default = "default_true")]
    pub read_events: bool,
    #[serde(default = "default_true")]
    pub connect_events: bool,
    #[serde(default = "default_true")]
    pub reactions: bool,
    #[serde(default = "default_true")]
    pub replies: bool,
    #[serde(default)]
    pub mutes: bool,
    /// 消息最大长度
    #[serde(default = "default_max_message_length")]
    pub max_message_length: u32,
    /// 自动审核策略
    #[serde(default)]
    pub automod: String,
}

fn default_true() -> bool {
    true
}

fn default_max_message_length() -> u32 {
    5000
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            typing_events: true,
            read_events: true,
            connect_events: true,
            reactions: true,
            replies: true,
            mutes: false,
            max_message_length: default_max_message_length(),
            automod: "disabled".to_string(),
        }
    }
}

/// 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub cid: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    /// 毫秒时间戳
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub reaction_count: u32,
}

/// 频道状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub cid: String,
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: ChannelConfig,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub watcher_count: u32,
    #[serde(default)]
    pub frozen: bool,
    /// 最后一条消息时间（毫秒）
    #[serde(default)]
    pub last_message_at: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    /// 按 created_at 升序
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub extra_data: HashMap<String, serde_json::Value>,
}

impl Channel {
    /// 创建频道（cid 由类型和 id 拼接）
    pub fn new(channel_type: impl Into<String>, id: impl Into<String>) -> Self {
        let channel_type = channel_type.into();
        let id = id.into();
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            cid: format!("{}:{}", channel_type, id),
            config: ChannelConfig::new(channel_type.clone()),
            id,
            channel_type,
            name: String::new(),
            member_count: 0,
            watcher_count: 0,
            frozen: false,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            extra_data: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// 只保留最新的 limit 条消息
    pub fn truncate_messages(&mut self, limit: usize) {
        if self.messages.len() > limit {
            let skip = self.messages.len() - limit;
            self.messages.drain(..skip);
        }
    }

    /// 追加消息并刷新 last_message_at；同 id 的消息原地替换
    pub fn upsert_message(&mut self, message: Message) {
        let created_at = message.created_at;
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => {
                self.messages.push(message);
                self.messages.sort_by_key(|m| m.created_at);
            }
        }
        if self.last_message_at.map_or(true, |ts| created_at > ts) {
            self.last_message_at = Some(created_at);
        }
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// 从 cid 拆出 (channel_type, id)
pub fn split_cid(cid: &str) -> Option<(&str, &str)> {
    let (channel_type, id) = cid.split_once(':')?;
    if channel_type.is_empty() || id.is_empty() {
        return None;
    }
    Some((channel_type, id))
}
