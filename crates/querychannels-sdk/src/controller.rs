//! 频道列表查询控制器
//!
//! 一个控制器对应一个 (filter, sort) 查询，负责：
//! - 离线优先：先从本地缓存发布结果，再视网络情况刷新
//! - 分页合并：首页整体替换，后续页追加，重复 cid 以最新数据覆盖
//! - 实时事件：新加入的频道置顶，频道级事件只做单点更新
//! - 同一时刻只允许一个查询在进行，冲突请求直接拒绝
//!
//! 已发布的频道列表是不可变快照，每次写入都基于旧快照生成新快照再原子替换。

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::QueryChannelsClient;
use crate::connection_state::ConnectivityOracle;
use crate::error::{QueryChannelsError, QueryPhase, Result};
use crate::events::ChatEvent;
use crate::models::Channel;
use crate::observable::Observable;
use crate::pagination::QueryChannelsPaginationRequest;
use crate::query::{FilterObject, QueryIdentity, QuerySort};
use crate::repository::ChannelStateRepository;
use crate::storage::{ChannelConfigEntity, QueryCacheStore, QueryChannelsEntity};

/// 新频道是否加入当前查询的客户端过滤条件
pub type ChannelPredicate = Arc<dyn Fn(&Channel, &FilterObject) -> bool + Send + Sync>;

/// 已发布的频道列表（有序，cid 唯一）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelListSnapshot {
    order: Vec<String>,
    channels: HashMap<String, Channel>,
}

impl ChannelListSnapshot {
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self::default().merged(channels, false)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.channels.contains_key(cid)
    }

    pub fn get(&self, cid: &str) -> Option<&Channel> {
        self.channels.get(cid)
    }

    pub fn cids(&self) -> &[String] {
        &self.order
    }

    /// 按发布顺序的频道列表
    pub fn channels(&self) -> Vec<Channel> {
        self.order
            .iter()
            .filter_map(|cid| self.channels.get(cid).cloned())
            .collect()
    }

    /// 合并新频道：已有的原位覆盖，没有的追加到末尾（on_top 时插到最前）
    pub fn merged(&self, incoming: Vec<Channel>, on_top: bool) -> Self {
        let mut channels = self.channels.clone();
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for channel in incoming {
            let cid = channel.cid.clone();
            let existed = channels.insert(cid.clone(), channel).is_some();
            if seen.insert(cid.clone()) && (on_top || !existed) {
                fresh.push(cid);
            }
        }

        let order = if on_top {
            let rest = self.order.iter().filter(|cid| !seen.contains(*cid)).cloned();
            fresh.into_iter().chain(rest).collect()
        } else {
            self.order.iter().cloned().chain(fresh).collect()
        };
        Self { order, channels }
    }

    /// 单点更新，未跟踪的频道返回 None
    pub fn with_channel(&self, channel: Channel) -> Option<Self> {
        if !self.contains(&channel.cid) {
            return None;
        }
        let mut next = self.clone();
        next.channels.insert(channel.cid.clone(), channel);
        Some(next)
    }

    pub fn without(&self, cid: &str) -> Option<Self> {
        if !self.contains(cid) {
            return None;
        }
        let mut next = self.clone();
        next.channels.remove(cid);
        next.order.retain(|c| c != cid);
        Some(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Idle,
    LoadingFirstPage,
    LoadingNextPage,
}

/// 加载中标记；drop 时回到 Idle（包括调用方取消 future 的情况）
struct LoaderGuard<'a> {
    controller: &'a QueryChannelsController,
    phase: QueryPhase,
}

impl Drop for LoaderGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.controller.loader.lock();
        *state = LoaderState::Idle;
        self.controller.loader_flag(self.phase).set_if_changed(false);
    }
}

/// 频道列表查询控制器
pub struct QueryChannelsController {
    id: QueryIdentity,
    filter: FilterObject,
    sort: QuerySort,
    query: Mutex<QueryChannelsEntity>,
    loader: Mutex<LoaderState>,
    client: Arc<dyn QueryChannelsClient>,
    query_cache: Arc<dyn QueryCacheStore>,
    repository: Arc<ChannelStateRepository>,
    connectivity: Arc<dyn ConnectivityOracle>,
    user_presence: bool,
    new_channel_filter: RwLock<Option<ChannelPredicate>>,

    channels: Observable<Arc<ChannelListSnapshot>>,
    loading: Observable<bool>,
    loading_more: Observable<bool>,
    end_of_channels: Observable<bool>,
    recovery_needed: Observable<bool>,
}

impl QueryChannelsController {
    pub fn new(
        filter: FilterObject,
        sort: QuerySort,
        client: Arc<dyn QueryChannelsClient>,
        query_cache: Arc<dyn QueryCacheStore>,
        repository: Arc<ChannelStateRepository>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        let query = QueryChannelsEntity::new(filter.clone(), sort.clone());
        Self {
            id: query.id.clone(),
            filter,
            sort,
            query: Mutex::new(query),
            loader: Mutex::new(LoaderState::Idle),
            client,
            query_cache,
            repository,
            connectivity,
            user_presence: false,
            new_channel_filter: RwLock::new(None),
            channels: Observable::new(Arc::new(ChannelListSnapshot::default())),
            loading: Observable::new(false),
            loading_more: Observable::new(false),
            end_of_channels: Observable::new(false),
            recovery_needed: Observable::new(false),
        }
    }

    pub fn with_user_presence(mut self, user_presence: bool) -> Self {
        self.user_presence = user_presence;
        self
    }

    pub fn with_new_channel_filter(self, predicate: ChannelPredicate) -> Self {
        self.set_new_channel_filter(Some(predicate));
        self
    }

    /// 替换新频道过滤条件（None 表示总是加入）
    pub fn set_new_channel_filter(&self, predicate: Option<ChannelPredicate>) {
        *self.new_channel_filter.write() = predicate;
    }

    pub fn id(&self) -> &QueryIdentity {
        &self.id
    }

    pub fn filter(&self) -> &FilterObject {
        &self.filter
    }

    pub fn sort(&self) -> &QuerySort {
        &self.sort
    }

    /// 当前查询实体（成员集合）
    pub fn query_entity(&self) -> QueryChannelsEntity {
        self.query.lock().clone()
    }

    // ========== 可观察状态 ==========

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.get().channels()
    }

    pub fn channels_snapshot(&self) -> Arc<ChannelListSnapshot> {
        self.channels.get()
    }

    pub fn subscribe_channels(&self) -> watch::Receiver<Arc<ChannelListSnapshot>> {
        self.channels.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more.get()
    }

    pub fn subscribe_loading_more(&self) -> watch::Receiver<bool> {
        self.loading_more.subscribe()
    }

    pub fn end_of_channels(&self) -> bool {
        self.end_of_channels.get()
    }

    pub fn subscribe_end_of_channels(&self) -> watch::Receiver<bool> {
        self.end_of_channels.subscribe()
    }

    pub fn recovery_needed(&self) -> bool {
        self.recovery_needed.get()
    }

    pub fn subscribe_recovery_needed(&self) -> watch::Receiver<bool> {
        self.recovery_needed.subscribe()
    }

    // ========== 查询 ==========

    /// 首页查询
    pub async fn query(&self, limit: u32, message_limit: u32) -> Result<Vec<Channel>> {
        self.run(QueryChannelsPaginationRequest::first_page(self.sort.clone(), limit, message_limit))
            .await
    }

    /// 加载下一页
    pub async fn load_more(&self, limit: u32, message_limit: u32) -> Result<Vec<Channel>> {
        self.run(self.load_more_request(limit, message_limit)).await
    }

    /// offset 取当前已发布的频道数量
    pub fn load_more_request(&self, limit: u32, message_limit: u32) -> QueryChannelsPaginationRequest {
        QueryChannelsPaginationRequest::next_page(
            self.sort.clone(),
            self.channels.get().len(),
            limit,
            message_limit,
        )
    }

    /// 执行一次分页查询：先离线发布，在线时再刷新
    ///
    /// 已有查询在进行时立即返回 `DuplicateInFlightQuery`，不做任何 I/O。
    /// 离线时返回缓存结果并标记 recovery_needed。
    pub async fn run(&self, page: QueryChannelsPaginationRequest) -> Result<Vec<Channel>> {
        let phase = if page.is_first_page() {
            QueryPhase::FirstPage
        } else {
            QueryPhase::NextPage
        };
        let _guard = self.begin(phase)?;

        let offline = self.run_offline(&page).await;

        if self.connectivity.is_online().await {
            self.run_online(&page).await
        } else {
            info!("[{}] 当前离线，返回缓存结果，等待恢复", self.id);
            self.recovery_needed.set_if_changed(true);
            Ok(offline.unwrap_or_default())
        }
    }

    fn begin(&self, phase: QueryPhase) -> Result<LoaderGuard<'_>> {
        let mut state = self.loader.lock();
        let in_progress = match *state {
            LoaderState::Idle => None,
            LoaderState::LoadingFirstPage => Some(QueryPhase::FirstPage),
            LoaderState::LoadingNextPage => Some(QueryPhase::NextPage),
        };
        if let Some(in_progress) = in_progress {
            debug!("[{}] 已有查询在进行中 ({})，忽略本次 {} 请求", self.id, in_progress, phase);
            return Err(QueryChannelsError::DuplicateInFlightQuery { in_progress });
        }

        *state = match phase {
            QueryPhase::FirstPage => LoaderState::LoadingFirstPage,
            QueryPhase::NextPage => LoaderState::LoadingNextPage,
        };
        self.loader_flag(phase).set_if_changed(true);
        Ok(LoaderGuard { controller: self, phase })
    }

    fn loader_flag(&self, phase: QueryPhase) -> &Observable<bool> {
        match phase {
            QueryPhase::FirstPage => &self.loading,
            QueryPhase::NextPage => &self.loading_more,
        }
    }

    /// 从本地缓存读取并发布；没有缓存或读取失败时返回 None
    pub async fn run_offline(&self, page: &QueryChannelsPaginationRequest) -> Option<Vec<Channel>> {
        let cached = match self.query_cache.select(&self.id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!("[{}] 读取查询缓存失败，按无缓存处理: {}", self.id, e);
                None
            }
        };
        let Some(cached) = cached else {
            debug!("[{}] 无离线缓存", self.id);
            return None;
        };

        let pairs = match self.repository.enrich_and_paginate(&cached.channel_cids, page).await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("[{}] 读取缓存频道失败，按无缓存处理: {}", self.id, e);
                return None;
            }
        };
        let channels: Vec<Channel> = pairs.into_iter().map(|pair| pair.channel).collect();
        info!("[{}] 离线缓存中找到 {} 个频道", self.id, channels.len());

        if page.is_first_page() {
            self.set_channels(&channels);
        } else {
            self.add_channels(&channels, false);
        }
        Some(channels)
    }

    /// 远端查询并合并结果
    pub async fn run_online(&self, page: &QueryChannelsPaginationRequest) -> Result<Vec<Channel>> {
        let request = page.to_query_channels_request(&self.filter, self.user_presence);
        let channels = match self.client.query_channels(request).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("[{}] 远端查询失败: {}", self.id, e);
                self.recovery_needed.set_if_changed(true);
                return Err(e);
            }
        };

        self.recovery_needed.set_if_changed(false);
        info!("[{}] 远端查询返回 {} 个频道", self.id, channels.len());
        if channels.len() < page.channel_limit as usize {
            self.end_of_channels.set_if_changed(true);
        }

        let mut configs: Vec<ChannelConfigEntity> = Vec::new();
        for channel in &channels {
            if !configs.iter().any(|c| c.channel_type == channel.channel_type) {
                configs.push(ChannelConfigEntity::new(channel.channel_type.clone(), channel.config.clone()));
            }
        }
        if let Err(e) = self.repository.insert_configs(configs).await {
            warn!("[{}] 保存频道配置失败: {}", self.id, e);
        }
        if let Err(e) = self.repository.store_state_for_channels(&channels).await {
            warn!("[{}] 保存频道状态失败: {}", self.id, e);
        }

        if page.is_first_page() {
            self.set_channels(&channels);
        } else {
            self.add_channels(&channels, false);
        }
        self.persist_query().await;

        Ok(channels)
    }

    // ========== 实时事件 ==========

    pub async fn handle_events(&self, events: &[ChatEvent]) {
        for event in events {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&self, event: &ChatEvent) {
        if let ChatEvent::NotificationAddedToChannel { channel, .. } = event {
            self.add_channel_if_filter_matches(channel.clone()).await;
        }

        if !event.is_channel_event() || event.is_presence_only() {
            return;
        }
        let Some(cid) = event.cid() else {
            return;
        };
        if !self.channels.get().contains(cid) {
            return;
        }

        debug!("[{}] 收到频道事件 {} ({})", self.id, event.event_type(), cid);
        match self.repository.resolve(cid).await {
            Some(channel) => {
                self.update_channel(channel);
            }
            None if matches!(event, ChatEvent::ChannelDeleted { .. }) => {
                self.channels.update_if(|current| current.without(cid).map(Arc::new));
            }
            None => debug!("[{}] 频道 {} 无法解析，保持原样", self.id, cid),
        }
    }

    /// 新频道通过过滤条件时置顶加入；返回是否加入
    pub async fn add_channel_if_filter_matches(&self, channel: Channel) -> bool {
        let predicate = self.new_channel_filter.read().clone();
        let should_be_added = predicate.map_or(true, |predicate| predicate(&channel, &self.filter));
        if !should_be_added {
            debug!("[{}] 频道 {} 不符合过滤条件，忽略", self.id, channel.cid);
            return false;
        }

        if let Err(e) = self.repository.upsert(channel.clone()).await {
            warn!("[{}] 保存频道 {} 失败: {}", self.id, channel.cid, e);
        }
        info!("[{}] 频道 {} 加入查询结果", self.id, channel.cid);
        let cid = channel.cid.clone();
        self.add_channels(&[channel], true);
        self.persist_prepended(cid).await;
        true
    }

    /// 只更新已跟踪的频道；返回是否更新
    pub fn update_channel(&self, channel: Channel) -> bool {
        self.channels
            .update_if(|current| current.with_channel(channel).map(Arc::new))
    }

    // ========== 内部 ==========

    /// 首页：整体替换（持久化成员按 cid 排序，发布顺序按结果顺序）
    fn set_channels(&self, channels: &[Channel]) {
        self.query
            .lock()
            .replace_cids(channels.iter().map(|c| c.cid.clone()));
        let resolved = self.resolve_published(channels);
        self.channels.set(Arc::new(ChannelListSnapshot::from_channels(resolved)));
    }

    fn add_channels(&self, channels: &[Channel], on_top: bool) {
        {
            let mut query = self.query.lock();
            let cids = channels.iter().map(|c| c.cid.clone());
            if on_top {
                query.prepend_cids(cids);
            } else {
                query.union_cids(cids);
            }
        }
        let resolved = self.resolve_published(channels);
        self.channels
            .update(|current| (Arc::new(current.merged(resolved, on_top)), ()));
    }

    fn resolve_published(&self, channels: &[Channel]) -> Vec<Channel> {
        channels
            .iter()
            .map(|c| self.repository.get(&c.cid).unwrap_or_else(|| c.clone()))
            .collect()
    }

    /// 置顶写入已保存的成员列表，不用内存中的分页窗口覆盖
    async fn persist_prepended(&self, cid: String) {
        let stored = match self.query_cache.select(&self.id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("[{}] 读取查询缓存失败: {}", self.id, e);
                None
            }
        };
        let entity = match stored {
            Some(mut stored) => {
                stored.prepend_cids([cid]);
                stored
            }
            None => self.query.lock().clone(),
        };
        if let Err(e) = self.query_cache.insert(&entity).await {
            warn!("[{}] 保存查询缓存失败: {}", self.id, e);
        }
    }

    async fn persist_query(&self) {
        let entity = self.query.lock().clone();
        if let Err(e) = self.query_cache.insert(&entity).await {
            warn!("[{}] 保存查询缓存失败: {}", self.id, e);
        }
    }
}
