//! 频道状态仓库 - 所有查询控制器共享的频道状态合并点
//!
//! 内存中保存每个频道的最新快照，写入时同步落到 ChannelRecordStore。
//! 控制器只通过这里读取和更新频道，保证同一频道在各个查询中状态一致。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::ChatEvent;
use crate::models::{Channel, ChannelConfig};
use crate::pagination::QueryChannelsPaginationRequest;
use crate::storage::{ChannelConfigEntity, ChannelEntity, ChannelRecordStore};

/// 分页读取结果：频道快照 + 存储元数据
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEntityPair {
    pub channel: Channel,
    /// 记录写入时间（毫秒），仅存在于内存的频道为 None
    pub stored_at: Option<i64>,
}

pub struct ChannelStateRepository {
    channels: RwLock<HashMap<String, Channel>>,
    configs: RwLock<HashMap<String, ChannelConfig>>,
    store: Arc<dyn ChannelRecordStore>,
}

impl ChannelStateRepository {
    pub fn new(store: Arc<dyn ChannelRecordStore>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// 从存储加载频道类型配置
    pub async fn load_configs(&self) -> Result<usize> {
        let configs = self.store.select_configs().await?;
        let mut cache = self.configs.write();
        for entity in configs {
            cache.insert(entity.channel_type, entity.config);
        }
        Ok(cache.len())
    }

    /// 内存中的频道快照
    pub fn get(&self, cid: &str) -> Option<Channel> {
        self.channels.read().get(cid).cloned()
    }

    /// 解析频道：先查内存，再查存储；存储异常按不存在处理
    pub async fn resolve(&self, cid: &str) -> Option<Channel> {
        if let Some(channel) = self.get(cid) {
            return Some(channel);
        }

        let loaded = match self.store.select_channels(vec![cid.to_string()]).await {
            Ok(entities) => entities.into_iter().next(),
            Err(e) => {
                warn!("读取频道 {} 失败: {}", cid, e);
                None
            }
        }?;

        let channel = self.attach_config(loaded.state);
        self.channels
            .write()
            .entry(channel.cid.clone())
            .or_insert_with(|| channel.clone());
        Some(channel)
    }

    /// 更新单个频道并持久化
    pub async fn upsert(&self, channel: Channel) -> Result<()> {
        let entity = ChannelEntity::from_channel(&channel);
        self.channels.write().insert(channel.cid.clone(), channel);
        self.store.insert_channels(vec![entity]).await
    }

    /// 批量更新频道并持久化
    pub async fn store_state_for_channels(&self, channels: &[Channel]) -> Result<()> {
        let entities: Vec<ChannelEntity> = channels.iter().map(ChannelEntity::from_channel).collect();
        {
            let mut cache = self.channels.write();
            for channel in channels {
                cache.insert(channel.cid.clone(), channel.clone());
            }
        }
        debug!("写入 {} 个频道状态", entities.len());
        self.store.insert_channels(entities).await
    }

    /// 更新频道类型配置
    pub async fn insert_configs(&self, configs: Vec<ChannelConfigEntity>) -> Result<()> {
        {
            let mut cache = self.configs.write();
            for entity in &configs {
                cache.insert(entity.channel_type.clone(), entity.config.clone());
            }
        }
        self.store.insert_configs(configs).await
    }

    pub fn config_for(&self, channel_type: &str) -> Option<ChannelConfig> {
        self.configs.read().get(channel_type).cloned()
    }

    /// 按成员顺序分页读取频道
    ///
    /// 跳过无法解析的 cid，重新挂上类型配置；返回的频道消息截断到 message_limit 条（保留最新），
    /// 仓库中的状态不受影响。
    pub async fn enrich_and_paginate(
        &self,
        cids: &[String],
        page: &QueryChannelsPaginationRequest,
    ) -> Result<Vec<ChannelEntityPair>> {
        let offset = (page.channel_offset as usize).min(cids.len());
        let end = offset.saturating_add(page.channel_limit as usize).min(cids.len());
        let window = &cids[offset..end];
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let stored: HashMap<String, ChannelEntity> = self
            .store
            .select_channels(window.to_vec())
            .await?
            .into_iter()
            .map(|entity| (entity.cid.clone(), entity))
            .collect();

        let mut pairs = Vec::with_capacity(window.len());
        {
            let mut cache = self.channels.write();
            for cid in window {
                let stored_at = stored.get(cid).map(|entity| entity.updated_at);
                let channel = match cache.get(cid) {
                    Some(channel) => channel.clone(),
                    None => match stored.get(cid) {
                        Some(entity) => entity.state.clone(),
                        None => {
                            debug!("频道 {} 无法解析，跳过", cid);
                            continue;
                        }
                    },
                };

                let channel = self.attach_config(channel);
                cache.entry(channel.cid.clone()).or_insert_with(|| channel.clone());

                // 只截断返回的副本，共享状态保留完整消息
                let mut channel = channel;
                channel.truncate_messages(page.message_limit as usize);
                pairs.push(ChannelEntityPair { channel, stored_at });
            }
        }
        Ok(pairs)
    }

    /// 把实时事件应用到频道状态
    pub async fn apply_event(&self, event: &ChatEvent) -> Result<()> {
        match event {
            ChatEvent::NotificationAddedToChannel { channel, .. }
            | ChatEvent::ChannelUpdated { channel, .. } => self.upsert(channel.clone()).await,
            ChatEvent::ChannelDeleted { cid, .. } => {
                self.channels.write().remove(cid);
                self.store.delete_channel(cid.clone()).await
            }
            ChatEvent::HealthCheck { .. }
            | ChatEvent::ConnectionChanged { .. }
            | ChatEvent::TypingStart { .. } => Ok(()),
            _ => {
                let Some(cid) = event.cid() else {
                    return Ok(());
                };
                let Some(mut channel) = self.resolve(cid).await else {
                    debug!("事件 {} 对应的频道 {} 不存在，忽略", event.event_type(), cid);
                    return Ok(());
                };
                if !Self::mutate(&mut channel, event) {
                    return Ok(());
                }
                self.upsert(channel).await
            }
        }
    }

    fn mutate(channel: &mut Channel, event: &ChatEvent) -> bool {
        match event {
            ChatEvent::ChannelTruncated { created_at, .. } => {
                channel.messages.clear();
                channel.updated_at = *created_at;
                true
            }
            ChatEvent::MessageNew { message, .. } | ChatEvent::MessageUpdated { message, .. } => {
                channel.upsert_message(message.clone());
                true
            }
            ChatEvent::ReactionNew { message_id, .. } => {
                match channel.messages.iter_mut().find(|m| &m.id == message_id) {
                    Some(message) => {
                        message.reaction_count += 1;
                        true
                    }
                    None => false,
                }
            }
            ChatEvent::MemberAdded { .. } => {
                channel.member_count += 1;
                true
            }
            ChatEvent::UserStartWatching { watcher_count, .. }
            | ChatEvent::UserStopWatching { watcher_count, .. } => {
                channel.watcher_count = *watcher_count;
                true
            }
            _ => false,
        }
    }

    fn attach_config(&self, mut channel: Channel) -> Channel {
        if let Some(config) = self.config_for(&channel.channel_type) {
            channel.config = config;
        }
        channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_builders;
    use crate::models::Message;
    use crate::query::QuerySort;
    use crate::storage::MemoryChannelStore;

    fn repository() -> (ChannelStateRepository, Arc<MemoryChannelStore>) {
        let store = Arc::new(MemoryChannelStore::new());
        (ChannelStateRepository::new(store.clone()), store)
    }

    fn cids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn message(cid: &str, id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            cid: cid.to_string(),
            text: id.to_string(),
            user_id: "u1".to_string(),
            created_at,
            updated_at: None,
            reaction_count: 0,
        }
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_store() {
        let (repo, store) = repository();
        store
            .insert_channels(vec![ChannelEntity::from_channel(&Channel::new("messaging", "a"))])
            .await
            .unwrap();

        assert!(repo.get("messaging:a").is_none());
        assert!(repo.resolve("messaging:a").await.is_some());
        assert!(repo.get("messaging:a").is_some());
        assert!(repo.resolve("messaging:missing").await.is_none());
    }

    #[tokio::test]
    async fn test_enrich_and_paginate() {
        let (repo, _store) = repository();
        let mut a = Channel::new("messaging", "a");
        for i in 0..5 {
            a.upsert_message(message("messaging:a", &format!("m{}", i), i));
        }
        let b = Channel::new("messaging", "b");
        let c = Channel::new("team", "c");
        repo.store_state_for_channels(&[a, b, c]).await.unwrap();

        let mut config = ChannelConfig::new("messaging");
        config.reactions = false;
        repo.insert_configs(vec![ChannelConfigEntity::new("messaging", config)])
            .await
            .unwrap();

        let members = cids(&["messaging:a", "messaging:gone", "messaging:b", "team:c"]);
        let page = QueryChannelsPaginationRequest::new(QuerySort::new(), 0, 3, 2);
        let pairs = repo.enrich_and_paginate(&members, &page).await.unwrap();

        let got: Vec<_> = pairs.iter().map(|p| p.channel.cid.as_str()).collect();
        assert_eq!(got, vec!["messaging:a", "messaging:b"]);
        assert_eq!(pairs[0].channel.messages.len(), 2);
        assert_eq!(pairs[0].channel.messages[1].id, "m4");
        assert!(!pairs[0].channel.config.reactions);
        assert!(pairs[0].stored_at.is_some());

        let page = QueryChannelsPaginationRequest::new(QuerySort::new(), 3, 3, 2);
        let pairs = repo.enrich_and_paginate(&members, &page).await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].channel.cid, "team:c");

        let page = QueryChannelsPaginationRequest::new(QuerySort::new(), 10, 3, 2);
        assert!(repo.enrich_and_paginate(&members, &page).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paginated_read_keeps_full_state() {
        let (repo, store) = repository();
        let mut a = Channel::new("messaging", "a");
        for i in 0..5 {
            a.upsert_message(message("messaging:a", &format!("m{}", i), i));
        }
        store
            .insert_channels(vec![ChannelEntity::from_channel(&a)])
            .await
            .unwrap();

        let page = QueryChannelsPaginationRequest::new(QuerySort::new(), 0, 10, 2);
        let pairs = repo
            .enrich_and_paginate(&cids(&["messaging:a"]), &page)
            .await
            .unwrap();
        assert_eq!(pairs[0].channel.messages.len(), 2);
        assert_eq!(repo.get("messaging:a").unwrap().messages.len(), 5);

        repo.apply_event(&ChatEvent::MemberAdded {
            cid: "messaging:a".to_string(),
            user_id: "u2".to_string(),
            created_at: 6,
        })
        .await
        .unwrap();
        let persisted = store.select_channels(cids(&["messaging:a"])).await.unwrap();
        assert_eq!(persisted[0].state.messages.len(), 5);
        assert_eq!(persisted[0].state.member_count, 1);
    }

    #[tokio::test]
    async fn test_apply_message_events() {
        let (repo, store) = repository();
        repo.upsert(Channel::new("messaging", "a")).await.unwrap();

        repo.apply_event(&event_builders::message_new(message("messaging:a", "m1", 10)))
            .await
            .unwrap();
        let channel = repo.get("messaging:a").unwrap();
        assert_eq!(channel.messages.len(), 1);
        assert_eq!(channel.last_message_at, Some(10));

        let persisted = store.select_channels(cids(&["messaging:a"])).await.unwrap();
        assert_eq!(persisted[0].state.messages.len(), 1);

        repo.apply_event(&ChatEvent::ReactionNew {
            cid: "messaging:a".to_string(),
            message_id: "m1".to_string(),
            user_id: "u2".to_string(),
            created_at: 11,
        })
        .await
        .unwrap();
        assert_eq!(repo.get("messaging:a").unwrap().messages[0].reaction_count, 1);

        repo.apply_event(&ChatEvent::ChannelTruncated {
            cid: "messaging:a".to_string(),
            created_at: 12,
        })
        .await
        .unwrap();
        assert!(repo.get("messaging:a").unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_apply_delete_and_unknown_channel() {
        let (repo, store) = repository();
        repo.upsert(Channel::new("messaging", "a")).await.unwrap();

        repo.apply_event(&ChatEvent::MemberAdded {
            cid: "messaging:unknown".to_string(),
            user_id: "u1".to_string(),
            created_at: 1,
        })
        .await
        .unwrap();
        assert!(repo.get("messaging:unknown").is_none());

        repo.apply_event(&event_builders::user_start_watching("messaging:a", "u1", 3))
            .await
            .unwrap();
        assert_eq!(repo.get("messaging:a").unwrap().watcher_count, 3);

        repo.apply_event(&ChatEvent::ChannelDeleted {
            cid: "messaging:a".to_string(),
            created_at: 2,
        })
        .await
        .unwrap();
        assert!(repo.get("messaging:a").is_none());
        assert!(store.select_channels(cids(&["messaging:a"])).await.unwrap().is_empty());
    }
}
