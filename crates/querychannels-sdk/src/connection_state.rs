//! 连接状态管理
//!
//! 提供网络可用性判断（ConnectivityOracle），默认实现为 ConnectionStateManager。

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 网络可用性
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// 未连接
    Disconnected,
    /// 连接中
    Connecting,
    /// 已连接
    Connected,
    /// 已认证
    Authenticated,
    /// 重连中
    Reconnecting,
    /// 连接失败
    Failed,
}

impl ConnectionStatus {
    pub fn is_online(self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Authenticated)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "未连接"),
            ConnectionStatus::Connecting => write!(f, "连接中"),
            ConnectionStatus::Connected => write!(f, "已连接"),
            ConnectionStatus::Authenticated => write!(f, "已认证"),
            ConnectionStatus::Reconnecting => write!(f, "重连中"),
            ConnectionStatus::Failed => write!(f, "连接失败"),
        }
    }
}

/// 连接状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// 连接建立时间（UTC毫秒时间戳）
    pub connected_at: Option<i64>,
    /// 最近一次状态变化时间（UTC毫秒时间戳）
    pub changed_at: i64,
    /// 断线次数
    pub disconnect_count: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            connected_at: None,
            changed_at: Utc::now().timestamp_millis(),
            disconnect_count: 0,
        }
    }

    /// 获取连接持续时间（秒）
    pub fn connection_duration_secs(&self) -> Option<i64> {
        self.connected_at
            .map(|connected_at| (Utc::now().timestamp_millis() - connected_at) / 1000)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// 连接状态管理器（线程安全）
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateManager {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新状态
    pub async fn set_status(&self, status: ConnectionStatus) {
        let mut state = self.state.write().await;
        if state.status == status {
            return;
        }
        let was_online = state.status.is_online();
        state.status = status;
        state.changed_at = Utc::now().timestamp_millis();
        if status.is_online() && !was_online {
            state.connected_at = Some(state.changed_at);
        } else if !status.is_online() && was_online {
            state.connected_at = None;
            state.disconnect_count += 1;
        }
        tracing::info!("连接状态变更: {}", status);
    }

    /// 标记连接成功
    pub async fn mark_connected(&self) {
        self.set_status(ConnectionStatus::Connected).await;
    }

    /// 标记断开连接
    pub async fn mark_disconnected(&self) {
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    /// 获取当前状态快照
    pub async fn get_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl ConnectivityOracle for ConnectionStateManager {
    async fn is_online(&self) -> bool {
        self.state.read().await.status.is_online()
    }
}
