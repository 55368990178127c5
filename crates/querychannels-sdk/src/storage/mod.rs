//! 存储模块 - 离线数据持久化层
//!
//! - QueryCacheStore: 查询标识 → 有序 cid 集合（sled）
//! - ChannelRecordStore: 频道状态与频道类型配置（SQLite，经 DbActor 访问）
//! - 关闭离线存储时两者都换成内存实现

use std::sync::Arc;

use crate::config::QueryChannelsConfig;
use crate::error::Result;

pub mod channel_store;
pub mod dao;
pub mod db_actor;
pub mod entities;
pub mod kv;
pub mod migrate;
pub mod query_cache;

pub use channel_store::{ChannelRecordStore, MemoryChannelStore};
pub use db_actor::DbActorHandle;
pub use entities::{ChannelConfigEntity, ChannelEntity, QueryChannelsEntity};
pub use kv::KvStore;
pub use query_cache::{KvQueryCacheStore, MemoryQueryCacheStore, QueryCacheStore};

const QUERY_TREE: &str = "query_channels";

/// 存储集合
#[derive(Clone)]
pub struct Repos {
    pub query_channels: Arc<dyn QueryCacheStore>,
    pub channels: Arc<dyn ChannelRecordStore>,
}

impl Repos {
    /// 按配置打开存储
    pub async fn open(config: &QueryChannelsConfig) -> Result<Self> {
        if !config.offline_enabled {
            tracing::info!("离线存储已关闭，使用内存存储");
            return Ok(Self::in_memory());
        }

        tokio::fs::create_dir_all(&config.data_dir).await?;
        let kv = Arc::new(KvStore::open(&config.kv_path(), QUERY_TREE).await?);
        let db = DbActorHandle::open(Some(config.sqlite_path())).await?;

        tracing::info!("离线存储已打开: {}", config.data_dir.display());
        Ok(Self {
            query_channels: Arc::new(KvQueryCacheStore::new(kv)),
            channels: Arc::new(db),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            query_channels: Arc::new(MemoryQueryCacheStore::new()),
            channels: Arc::new(MemoryChannelStore::new()),
        }
    }
}
