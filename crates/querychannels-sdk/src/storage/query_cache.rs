//! 查询缓存存储 - 查询标识 → QueryChannelsEntity
//!
//! Key 格式：query_channels:{query_id}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::query::QueryIdentity;
use crate::storage::entities::QueryChannelsEntity;
use crate::storage::kv::KvStore;

const PREFIX: &str = "query_channels";

/// 查询缓存存储
#[async_trait]
pub trait QueryCacheStore: Send + Sync {
    async fn select(&self, id: &QueryIdentity) -> Result<Option<QueryChannelsEntity>>;
    async fn insert(&self, entity: &QueryChannelsEntity) -> Result<()>;
}

/// sled 实现
pub struct KvQueryCacheStore {
    kv: Arc<KvStore>,
}

impl KvQueryCacheStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn key(id: &QueryIdentity) -> String {
        format!("{}:{}", PREFIX, id)
    }

    /// 所有缓存的查询
    pub async fn select_all(&self) -> Result<Vec<QueryChannelsEntity>> {
        self.kv.scan_prefix(format!("{}:", PREFIX).as_bytes()).await
    }
}

#[async_trait]
impl QueryCacheStore for KvQueryCacheStore {
    async fn select(&self, id: &QueryIdentity) -> Result<Option<QueryChannelsEntity>> {
        self.kv.get(Self::key(id)).await
    }

    async fn insert(&self, entity: &QueryChannelsEntity) -> Result<()> {
        self.kv.set(Self::key(&entity.id), entity).await
    }
}

/// 内存实现（关闭离线存储时使用）
#[derive(Default)]
pub struct MemoryQueryCacheStore {
    entries: RwLock<HashMap<QueryIdentity, QueryChannelsEntity>>,
}

impl MemoryQueryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryCacheStore for MemoryQueryCacheStore {
    async fn select(&self, id: &QueryIdentity) -> Result<Option<QueryChannelsEntity>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn insert(&self, entity: &QueryChannelsEntity) -> Result<()> {
        self.entries.write().await.insert(entity.id.clone(), entity.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterObject, QuerySort};
    use tempfile::TempDir;

    fn entity(cids: &[&str]) -> QueryChannelsEntity {
        let mut entity = QueryChannelsEntity::new(FilterObject::eq("type", "messaging"), QuerySort::new().desc("last_message_at"));
        entity.replace_cids(cids.iter().map(|s| s.to_string()));
        entity
    }

    #[test]
    fn cache_key_format() {
        let entity = entity(&[]);
        assert_eq!(
            KvQueryCacheStore::key(&entity.id),
            format!("query_channels:{}", entity.id.as_str())
        );
    }

    #[tokio::test]
    async fn test_kv_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let kv = Arc::new(KvStore::open(temp_dir.path(), "query_channels").await.unwrap());
        let store = KvQueryCacheStore::new(kv);

        let entity = entity(&["messaging:b", "messaging:a"]);
        assert!(store.select(&entity.id).await.unwrap().is_none());

        store.insert(&entity).await.unwrap();
        let loaded = store.select(&entity.id).await.unwrap().unwrap();
        assert_eq!(loaded.channel_cids, vec!["messaging:a", "messaging:b"]);
        assert_eq!(loaded.filter, entity.filter);
        assert_eq!(store.select_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryQueryCacheStore::new();
        let mut entity = entity(&["messaging:a"]);
        store.insert(&entity).await.unwrap();
        entity.union_cids(vec!["messaging:z".to_string()]);
        store.insert(&entity).await.unwrap();

        let loaded = store.select(&entity.id).await.unwrap().unwrap();
        assert_eq!(loaded.channel_cids, vec!["messaging:a", "messaging:z"]);
    }
}
