//! 频道记录存储 - 频道状态与频道类型配置

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::entities::{ChannelConfigEntity, ChannelEntity};

/// 频道记录存储
#[async_trait]
pub trait ChannelRecordStore: Send + Sync {
    async fn insert_channels(&self, channels: Vec<ChannelEntity>) -> Result<()>;
    /// 结果顺序与入参一致，不存在的 cid 跳过
    async fn select_channels(&self, cids: Vec<String>) -> Result<Vec<ChannelEntity>>;
    async fn delete_channel(&self, cid: String) -> Result<()>;
    async fn insert_configs(&self, configs: Vec<ChannelConfigEntity>) -> Result<()>;
    async fn select_configs(&self) -> Result<Vec<ChannelConfigEntity>>;
}

/// 内存实现（关闭离线存储时使用）
#[derive(Default)]
pub struct MemoryChannelStore {
    channels: RwLock<HashMap<String, ChannelEntity>>,
    configs: RwLock<HashMap<String, ChannelConfigEntity>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelRecordStore for MemoryChannelStore {
    async fn insert_channels(&self, channels: Vec<ChannelEntity>) -> Result<()> {
        let mut map = self.channels.write().await;
        for entity in channels {
            map.insert(entity.cid.clone(), entity);
        }
        Ok(())
    }

    async fn select_channels(&self, cids: Vec<String>) -> Result<Vec<ChannelEntity>> {
        let map = self.channels.read().await;
        Ok(cids.iter().filter_map(|cid| map.get(cid).cloned()).collect())
    }

    async fn delete_channel(&self, cid: String) -> Result<()> {
        self.channels.write().await.remove(&cid);
        Ok(())
    }

    async fn insert_configs(&self, configs: Vec<ChannelConfigEntity>) -> Result<()> {
        let mut map = self.configs.write().await;
        for entity in configs {
            map.insert(entity.channel_type.clone(), entity);
        }
        Ok(())
    }

    async fn select_configs(&self) -> Result<Vec<ChannelConfigEntity>> {
        let mut configs: Vec<_> = self.configs.read().await.values().cloned().collect();
        configs.sort_by(|a, b| a.channel_type.cmp(&b.channel_type));
        Ok(configs)
    }
}
