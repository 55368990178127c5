//! 事件路由
//!
//! 每个事件先应用到频道状态仓库，再按顺序转发给所有已注册的查询控制器，
//! 控制器重新解析频道时读到的就是最新状态。

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::QueryChannelsController;
use crate::events::ChatEvent;
use crate::query::QueryIdentity;
use crate::repository::ChannelStateRepository;

pub struct EventRouter {
    repository: Arc<ChannelStateRepository>,
    controllers: RwLock<Vec<Arc<QueryChannelsController>>>,
}

impl EventRouter {
    pub fn new(repository: Arc<ChannelStateRepository>) -> Self {
        Self {
            repository,
            controllers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, controller: Arc<QueryChannelsController>) {
        let mut controllers = self.controllers.write();
        if controllers.iter().any(|c| c.id() == controller.id()) {
            return;
        }
        debug!("注册查询控制器: {}", controller.id());
        controllers.push(controller);
    }

    pub fn unregister(&self, id: &QueryIdentity) -> bool {
        let mut controllers = self.controllers.write();
        let before = controllers.len();
        controllers.retain(|c| c.id() != id);
        controllers.len() != before
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.read().len()
    }

    /// 按顺序处理一批事件
    pub async fn route(&self, events: &[ChatEvent]) {
        for event in events {
            if let Err(e) = self.repository.apply_event(event).await {
                warn!("应用事件 {} 失败: {}", event.event_type(), e);
            }
        }

        let controllers = self.controllers.read().clone();
        for controller in controllers {
            controller.handle_events(events).await;
        }
    }

    /// 在后台消费事件总线，总线关闭时退出
    pub fn spawn(self: Arc<Self>, mut receiver: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("事件路由已启动");
            loop {
                match receiver.recv().await {
                    Ok(event) => self.route(std::slice::from_ref(&event)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("事件路由处理过慢，丢弃了 {} 个事件", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("事件总线已关闭，事件路由退出");
                        break;
                    }
                }
            }
        })
    }
}
