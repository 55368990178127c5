//! 测试辅助：可编排的远端客户端与可切换的网络状态

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::client::QueryChannelsClient;
use crate::connection_state::ConnectivityOracle;
use crate::error::{QueryChannelsError, Result};
use crate::models::Channel;
use crate::pagination::QueryChannelsRequest;

/// 按顺序返回预置结果的远端客户端
#[derive(Default)]
pub struct FakeClient {
    responses: Mutex<VecDeque<Result<Vec<Channel>>>>,
    requests: Mutex<Vec<QueryChannelsRequest>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用先等待 gate 放行
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, channels: Vec<Channel>) {
        self.responses.lock().push_back(Ok(channels));
    }

    pub fn push_err(&self, code: u32, message: &str) {
        self.responses
            .lock()
            .push_back(Err(QueryChannelsError::from_remote(code, message)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<QueryChannelsRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl QueryChannelsClient for FakeClient {
    async fn query_channels(&self, request: QueryChannelsRequest) -> Result<Vec<Channel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| QueryChannelsError::from_remote(0, "gate closed"))?;
            permit.forget();
        }
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// 可切换的网络状态
pub struct FakeConnectivity {
    online: AtomicBool,
}

impl FakeConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityOracle for FakeConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// 构造频道
pub fn channel(id: &str) -> Channel {
    Channel::new("messaging", id).with_name(id)
}

pub fn channels(ids: &[&str]) -> Vec<Channel> {
    ids.iter().map(|id| channel(id)).collect()
}

/// 测试日志（重复调用安全）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
