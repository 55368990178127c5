//! 事件系统模块 - 实时事件定义与广播
//!
//! 功能包括：
//! - 频道相关的实时事件（新消息、频道更新、加入频道通知等）
//! - 事件广播和订阅机制
//! - 事件统计

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{Channel, Message};

/// 实时事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// 当前用户被加入某个频道（用户级通知，不属于频道事件）
    NotificationAddedToChannel { channel: Channel, created_at: i64 },
    /// 频道信息更新
    ChannelUpdated { channel: Channel, created_at: i64 },
    /// 频道被删除
    ChannelDeleted { cid: String, created_at: i64 },
    /// 频道消息被清空
    ChannelTruncated { cid: String, created_at: i64 },
    /// 新消息
    MessageNew { cid: String, message: Message, created_at: i64 },
    /// 消息更新
    MessageUpdated { cid: String, message: Message, created_at: i64 },
    /// 新反应
    ReactionNew { cid: String, message_id: String, user_id: String, created_at: i64 },
    /// 新成员
    MemberAdded { cid: String, user_id: String, created_at: i64 },
    /// 开始输入
    TypingStart { cid: String, user_id: String, created_at: i64 },
    /// 开始观看频道（仅影响在线展示）
    UserStartWatching { cid: String, user_id: String, watcher_count: u32, created_at: i64 },
    /// 停止观看频道（仅影响在线展示）
    UserStopWatching { cid: String, user_id: String, watcher_count: u32, created_at: i64 },
    /// 心跳
    HealthCheck { created_at: i64 },
    /// 连接状态变化
    ConnectionChanged { online: bool, created_at: i64 },
}

impl ChatEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::NotificationAddedToChannel { .. } => "notification.added_to_channel",
            ChatEvent::ChannelUpdated { .. } => "channel.updated",
            ChatEvent::ChannelDeleted { .. } => "channel.deleted",
            ChatEvent::ChannelTruncated { .. } => "channel.truncated",
            ChatEvent::MessageNew { .. } => "message.new",
            ChatEvent::MessageUpdated { .. } => "message.updated",
            ChatEvent::ReactionNew { .. } => "reaction.new",
            ChatEvent::MemberAdded { .. } => "member.added",
            ChatEvent::TypingStart { .. } => "typing.start",
            ChatEvent::UserStartWatching { .. } => "user.watching.start",
            ChatEvent::UserStopWatching { .. } => "user.watching.stop",
            ChatEvent::HealthCheck { .. } => "health.check",
            ChatEvent::ConnectionChanged { .. } => "connection.changed",
        }
    }

    /// 事件关联的频道 cid
    pub fn cid(&self) -> Option<&str> {
        match self {
            ChatEvent::NotificationAddedToChannel { channel, .. } => Some(&channel.cid),
            ChatEvent::ChannelUpdated { channel, .. } => Some(&channel.cid),
            ChatEvent::ChannelDeleted { cid, .. }
            | ChatEvent::ChannelTruncated { cid, .. }
            | ChatEvent::MessageNew { cid, .. }
            | ChatEvent::MessageUpdated { cid, .. }
            | ChatEvent::ReactionNew { cid, .. }
            | ChatEvent::MemberAdded { cid, .. }
            | ChatEvent::TypingStart { cid, .. }
            | ChatEvent::UserStartWatching { cid, .. }
            | ChatEvent::UserStopWatching { cid, .. } => Some(cid),
            ChatEvent::HealthCheck { .. } | ChatEvent::ConnectionChanged { .. } => None,
        }
    }

    /// 是否为频道级事件（notification.* 属于用户级通知）
    pub fn is_channel_event(&self) -> bool {
        !matches!(self, ChatEvent::NotificationAddedToChannel { .. }) && self.cid().is_some()
    }

    /// 是否只影响在线展示（watch start/stop）
    pub fn is_presence_only(&self) -> bool {
        matches!(
            self,
            ChatEvent::UserStartWatching { .. } | ChatEvent::UserStopWatching { .. }
        )
    }

    pub fn created_at(&self) -> i64 {
        match self {
            ChatEvent::NotificationAddedToChannel { created_at, .. }
            | ChatEvent::ChannelUpdated { created_at, .. }
            | ChatEvent::ChannelDeleted { created_at, .. }
            | ChatEvent::ChannelTruncated { created_at, .. }
            | ChatEvent::MessageNew { created_at, .. }
            | ChatEvent::MessageUpdated { created_at, .. }
            | ChatEvent::ReactionNew { created_at, .. }
            | ChatEvent::MemberAdded { created_at, .. }
            | ChatEvent::TypingStart { created_at, .. }
            | ChatEvent::UserStartWatching { created_at, .. }
            | ChatEvent::UserStopWatching { created_at, .. }
            | ChatEvent::HealthCheck { created_at }
            | ChatEvent::ConnectionChanged { created_at, .. } => *created_at,
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 最后事件时间
    pub last_event_time: Option<i64>,
}

/// 事件总线（实时事件的唯一入口，顺序广播给所有订阅者）
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
    stats: Arc<parking_lot::Mutex<EventStats>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            stats: Arc::new(parking_lot::Mutex::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: ChatEvent) {
        debug!("Emitting event: {}", event.event_type());
        {
            let mut stats = self.stats.lock();
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.created_at());
        }

        // 无订阅者时 send 会失败，属正常场景
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    pub fn stats(&self) -> EventStats {
        self.stats.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 事件生成器 - 辅助函数
pub mod event_builders {
    use super::*;

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn added_to_channel(channel: Channel) -> ChatEvent {
        ChatEvent::NotificationAddedToChannel { channel, created_at: now() }
    }

    pub fn channel_updated(channel: Channel) -> ChatEvent {
        ChatEvent::ChannelUpdated { channel, created_at: now() }
    }

    pub fn message_new(message: Message) -> ChatEvent {
        ChatEvent::MessageNew {
            cid: message.cid.clone(),
            message,
            created_at: now(),
        }
    }

    pub fn user_start_watching(cid: &str, user_id: &str, watcher_count: u32) -> ChatEvent {
        ChatEvent::UserStartWatching {
            cid: cid.to_string(),
            user_id: user_id.to_string(),
            watcher_count,
            created_at: now(),
        }
    }

    pub fn user_stop_watching(cid: &str, user_id: &str, watcher_count: u32) -> ChatEvent {
        ChatEvent::UserStopWatching {
            cid: cid.to_string(),
            user_id: user_id.to_string(),
            watcher_count,
            created_at: now(),
        }
    }
}
