//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本模块提供：
//! - 命名 Tree 隔离（每类数据一个 Tree）
//! - serde_json 编码的值
//! - 前缀扫描

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{QueryChannelsError, Result};

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    path: PathBuf,
    db: Arc<Db>,
    tree: Tree,
}

impl KvStore {
    /// 打开（或创建）KV 存储，并打开指定名称的 Tree
    pub async fn open(path: &Path, tree_name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| QueryChannelsError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 旧实例可能刚释放锁，重试几次带退避
        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 100;
        let mut attempt = 0;
        let db = loop {
            match sled::open(path) {
                Ok(db) => break db,
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    attempt += 1;
                    if !is_lock || attempt >= MAX_OPEN_RETRIES {
                        return Err(QueryChannelsError::KvStore(format!("打开 sled 数据库失败: {}", e)));
                    }
                    let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
            }
        };

        let tree = db
            .open_tree(tree_name)
            .map_err(|e| QueryChannelsError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        tracing::info!("KV 存储已打开: {} (tree={})", path.display(), tree_name);

        Ok(Self {
            path: path.to_path_buf(),
            db: Arc::new(db),
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 设置键值对
    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| QueryChannelsError::Serialization(format!("序列化值失败: {}", e)))?;
        self.tree
            .insert(key, value_bytes)
            .map_err(|e| QueryChannelsError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    /// 获取键值对
    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let result = self
            .tree
            .get(key)
            .map_err(|e| QueryChannelsError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| QueryChannelsError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub async fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<bool> {
        let removed = self
            .tree
            .remove(key)
            .map_err(|e| QueryChannelsError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(removed.is_some())
    }

    /// 获取指定前缀的所有值
    pub async fn scan_prefix<V>(&self, prefix: &[u8]) -> Result<Vec<V>>
    where
        V: for<'de> Deserialize<'de>,
    {
        let mut results = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (_, value_bytes) =
                item.map_err(|e| QueryChannelsError::KvStore(format!("扫描前缀失败: {}", e)))?;
            let value = serde_json::from_slice(&value_bytes)
                .map_err(|e| QueryChannelsError::Serialization(format!("反序列化值失败: {}", e)))?;
            results.push(value);
        }
        Ok(results)
    }

    /// 刷盘
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| QueryChannelsError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::open(temp_dir.path(), "test").await.unwrap();

        kv.set("a:1", &vec![1u32, 2, 3]).await.unwrap();
        let value: Option<Vec<u32>> = kv.get("a:1").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        assert!(kv.delete("a:1").await.unwrap());
        let value: Option<Vec<u32>> = kv.get("a:1").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::open(temp_dir.path(), "test").await.unwrap();
        kv.set("q:1", &"one").await.unwrap();
        kv.set("q:2", &"two").await.unwrap();
        kv.set("other", &"x").await.unwrap();
        kv.flush().await.unwrap();

        let values: Vec<String> = kv.scan_prefix(b"q:").await.unwrap();
        assert_eq!(values, vec!["one".to_string(), "two".to_string()]);
    }
}
