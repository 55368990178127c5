//! 查询域 - 组装存储、频道状态仓库、事件总线与查询控制器
//!
//! 同一个 (filter, sort) 只会创建一个控制器，所有控制器共享同一个频道状态仓库。

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::QueryChannelsClient;
use crate::config::QueryChannelsConfig;
use crate::connection_state::ConnectivityOracle;
use crate::controller::{ChannelPredicate, QueryChannelsController};
use crate::error::Result;
use crate::events::{ChatEvent, EventBus};
use crate::http_client::HttpQueryChannelsClient;
use crate::models::Channel;
use crate::query::{FilterObject, QueryIdentity, QuerySort};
use crate::repository::ChannelStateRepository;
use crate::router::EventRouter;
use crate::storage::Repos;

pub struct QueryChannelsDomain {
    config: QueryChannelsConfig,
    repos: Repos,
    repository: Arc<ChannelStateRepository>,
    client: Arc<dyn QueryChannelsClient>,
    connectivity: Arc<dyn ConnectivityOracle>,
    event_bus: Arc<EventBus>,
    router: Arc<EventRouter>,
    router_task: Mutex<Option<JoinHandle<()>>>,
    controllers: Mutex<HashMap<QueryIdentity, Arc<QueryChannelsController>>>,
}

impl QueryChannelsDomain {
    /// 打开存储并启动事件路由
    pub async fn open(
        config: QueryChannelsConfig,
        client: Arc<dyn QueryChannelsClient>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Result<Self> {
        config.validate()?;
        info!("{}", crate::version::version_summary());

        let repos = Repos::open(&config).await?;
        let repository = Arc::new(ChannelStateRepository::new(repos.channels.clone()));
        let configs = repository.load_configs().await?;
        info!("已加载 {} 个频道类型配置", configs);

        let event_bus = Arc::new(EventBus::new(config.event_capacity));
        let router = Arc::new(EventRouter::new(repository.clone()));
        let router_task = router.clone().spawn(event_bus.subscribe());

        Ok(Self {
            config,
            repos,
            repository,
            client,
            connectivity,
            event_bus,
            router,
            router_task: Mutex::new(Some(router_task)),
            controllers: Mutex::new(HashMap::new()),
        })
    }

    /// 使用 HTTP 远端客户端打开
    pub async fn open_http(config: QueryChannelsConfig, connectivity: Arc<dyn ConnectivityOracle>) -> Result<Self> {
        let client = Arc::new(HttpQueryChannelsClient::new(&config)?);
        Self::open(config, client, connectivity).await
    }

    pub fn config(&self) -> &QueryChannelsConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<ChannelStateRepository> {
        &self.repository
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// 发布实时事件（由事件路由异步处理）
    pub fn emit(&self, event: ChatEvent) {
        self.event_bus.emit(event);
    }

    /// 同步处理一批事件，返回时所有控制器已处理完毕
    pub async fn handle_events(&self, events: &[ChatEvent]) {
        self.router.route(events).await;
    }

    /// 获取（或创建）查询控制器
    pub fn query_channels(&self, filter: FilterObject, sort: QuerySort) -> Arc<QueryChannelsController> {
        let id = QueryIdentity::new(&filter, &sort);
        let mut controllers = self.controllers.lock();
        if let Some(controller) = controllers.get(&id) {
            return controller.clone();
        }

        let controller = Arc::new(
            QueryChannelsController::new(
                filter,
                sort,
                self.client.clone(),
                self.repos.query_channels.clone(),
                self.repository.clone(),
                self.connectivity.clone(),
            )
            .with_user_presence(self.config.user_presence),
        );
        info!("创建查询控制器: {}", id);
        self.router.register(controller.clone());
        controllers.insert(id, controller.clone());
        controller
    }

    /// 获取查询控制器并设置新频道过滤条件
    pub fn query_channels_with_filter(
        &self,
        filter: FilterObject,
        sort: QuerySort,
        predicate: ChannelPredicate,
    ) -> Arc<QueryChannelsController> {
        let controller = self.query_channels(filter, sort);
        controller.set_new_channel_filter(Some(predicate));
        controller
    }

    /// 需要恢复的查询
    pub fn queries_needing_recovery(&self) -> Vec<Arc<QueryChannelsController>> {
        self.controllers
            .lock()
            .values()
            .filter(|c| c.recovery_needed())
            .cloned()
            .collect()
    }

    /// 重新执行需要恢复的查询首页
    pub async fn recover(&self) -> Vec<(QueryIdentity, Result<Vec<Channel>>)> {
        let pending = self.queries_needing_recovery();
        if pending.is_empty() {
            return Vec::new();
        }
        info!("恢复 {} 个查询", pending.len());

        let limit = self.config.channel_limit;
        let message_limit = self.config.message_limit;
        let results = join_all(pending.iter().map(|c| c.query(limit, message_limit))).await;

        pending
            .iter()
            .zip(results)
            .map(|(controller, result)| {
                if let Err(e) = &result {
                    warn!("查询 {} 恢复失败: {}", controller.id(), e);
                }
                (controller.id().clone(), result)
            })
            .collect()
    }

    /// 停止事件路由
    pub fn shutdown(&self) {
        if let Some(task) = self.router_task.lock().take() {
            task.abort();
            info!("查询域已关闭");
        }
    }
}

impl Drop for QueryChannelsDomain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_builders;
    use crate::test_support::{channel, channels, FakeClient, FakeConnectivity};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> QueryChannelsConfig {
        QueryChannelsConfig::builder()
            .data_dir(dir.path())
            .channel_limit(2)
            .build()
    }

    fn messaging() -> (FilterObject, QuerySort) {
        (FilterObject::eq("type", "messaging"), QuerySort::new().desc("last_message_at"))
    }

    #[tokio::test]
    async fn test_one_controller_per_query() {
        let dir = TempDir::new().unwrap();
        let domain = QueryChannelsDomain::open(
            config(&dir),
            Arc::new(FakeClient::new()),
            Arc::new(FakeConnectivity::new(true)),
        )
        .await
        .unwrap();

        let (filter, sort) = messaging();
        let a = domain.query_channels(filter.clone(), sort.clone());
        let b = domain.query_channels(filter, sort);
        assert!(Arc::ptr_eq(&a, &b));

        let other = domain.query_channels(FilterObject::none(), QuerySort::new());
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn test_cached_results_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let client = Arc::new(FakeClient::new());
            client.push_ok(channels(&["a", "b"]));
            let domain = QueryChannelsDomain::open(config(&dir), client, Arc::new(FakeConnectivity::new(true)))
                .await
                .unwrap();
            let (filter, sort) = messaging();
            domain.query_channels(filter, sort).query(2, 10).await.unwrap();
            domain.shutdown();
        }
        // 让被中止的路由任务释放存储句柄
        tokio::task::yield_now().await;

        let client = Arc::new(FakeClient::new());
        let domain = QueryChannelsDomain::open(config(&dir), client.clone(), Arc::new(FakeConnectivity::new(false)))
            .await
            .unwrap();
        let (filter, sort) = messaging();
        let controller = domain.query_channels(filter, sort);
        let result = controller.query(2, 10).await.unwrap();

        let cids: Vec<_> = result.iter().map(|c| c.cid.as_str()).collect();
        assert_eq!(cids, vec!["messaging:a", "messaging:b"]);
        assert!(controller.recovery_needed());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_recover_reruns_pending_queries() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::new());
        let connectivity = Arc::new(FakeConnectivity::new(false));
        let domain = QueryChannelsDomain::open(config(&dir), client.clone(), connectivity.clone())
            .await
            .unwrap();

        let (filter, sort) = messaging();
        let controller = domain.query_channels(filter, sort);
        controller.query(2, 10).await.unwrap();
        assert_eq!(domain.queries_needing_recovery().len(), 1);

        connectivity.set_online(true);
        client.push_ok(channels(&["a"]));
        let results = domain.recover().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        assert!(domain.queries_needing_recovery().is_empty());
        assert!(domain.recover().await.is_empty());
    }

    #[tokio::test]
    async fn test_emitted_events_reach_controllers() {
        let dir = TempDir::new().unwrap();
        let domain = QueryChannelsDomain::open(
            config(&dir),
            Arc::new(FakeClient::new()),
            Arc::new(FakeConnectivity::new(true)),
        )
        .await
        .unwrap();

        let (filter, sort) = messaging();
        let predicate: ChannelPredicate =
            Arc::new(|channel: &Channel, _filter: &FilterObject| channel.channel_type == "messaging");
        let controller = domain.query_channels_with_filter(filter, sort, predicate);

        domain.handle_events(&[event_builders::added_to_channel(Channel::new("team", "t"))]).await;
        assert!(controller.channels().is_empty());

        let mut receiver = controller.subscribe_channels();
        domain.emit(event_builders::added_to_channel(channel("live")));
        tokio::time::timeout(Duration::from_secs(2), receiver.wait_for(|list| !list.is_empty()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.channels()[0].cid, "messaging:live");
        assert!(domain.repository().get("messaging:live").is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = QueryChannelsConfig::builder()
            .data_dir(dir.path())
            .channel_limit(0)
            .build();
        let result = QueryChannelsDomain::open(
            config,
            Arc::new(FakeClient::new()),
            Arc::new(FakeConnectivity::new(true)),
        )
        .await;
        assert!(result.is_err());
    }
}
