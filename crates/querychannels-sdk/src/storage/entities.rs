//! 数据实体定义 - 对应持久化结构
//!
//! - QueryChannelsEntity: 查询缓存（查询标识 → 有序去重的 cid 集合），存 sled
//! - ChannelEntity: 单个频道的完整状态，存 channel 表
//! - ChannelConfigEntity: 频道类型配置，存 channel_config 表

use serde::{Deserialize, Serialize};

use crate::models::{Channel, ChannelConfig};
use crate::query::{FilterObject, QueryIdentity, QuerySort};

/// 查询缓存实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChannelsEntity {
    pub id: QueryIdentity,
    pub filter: FilterObject,
    pub sort: QuerySort,
    /// 每个 cid 至多出现一次
    pub channel_cids: Vec<String>,
    /// 毫秒时间戳
    pub updated_at: i64,
}

impl QueryChannelsEntity {
    pub fn new(filter: FilterObject, sort: QuerySort) -> Self {
        Self {
            id: QueryIdentity::new(&filter, &sort),
            filter,
            sort,
            channel_cids: Vec::new(),
            updated_at: 0,
        }
    }

    /// 首页结果整体替换，按 cid 排序存储
    pub fn replace_cids<I: IntoIterator<Item = String>>(&mut self, cids: I) {
        let mut cids: Vec<String> = cids.into_iter().collect();
        cids.sort();
        cids.dedup();
        self.channel_cids = cids;
        self.touch();
    }

    /// 追加未出现过的 cid，已有顺序不变
    pub fn union_cids<I: IntoIterator<Item = String>>(&mut self, cids: I) {
        for cid in cids {
            if !self.channel_cids.contains(&cid) {
                self.channel_cids.push(cid);
            }
        }
        self.touch();
    }

    /// 新 cid 放到最前面，其余保持原顺序
    pub fn prepend_cids<I: IntoIterator<Item = String>>(&mut self, cids: I) {
        let mut front: Vec<String> = Vec::new();
        for cid in cids {
            if !front.contains(&cid) {
                front.push(cid);
            }
        }
        let rest: Vec<String> = self
            .channel_cids
            .drain(..)
            .filter(|cid| !front.contains(cid))
            .collect();
        front.extend(rest);
        self.channel_cids = front;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// 频道记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntity {
    pub cid: String,
    pub channel_type: String,
    pub state: Channel,
    /// 写入时间（毫秒）
    pub updated_at: i64,
}

impl ChannelEntity {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            cid: channel.cid.clone(),
            channel_type: channel.channel_type.clone(),
            state: channel.clone(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 频道类型配置记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfigEntity {
    pub channel_type: String,
    pub config: ChannelConfig,
}

impl ChannelConfigEntity {
    pub fn new(channel_type: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            channel_type: channel_type.into(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> QueryChannelsEntity {
        QueryChannelsEntity::new(FilterObject::eq("type", "messaging"), QuerySort::new())
    }

    fn cids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_sorts_and_dedups() {
        let mut entity = entity();
        entity.replace_cids(cids(&["m:c", "m:a", "m:c", "m:b"]));
        assert_eq!(entity.channel_cids, cids(&["m:a", "m:b", "m:c"]));
        assert!(entity.updated_at > 0);
    }

    #[test]
    fn test_union_appends_unseen_only() {
        let mut entity = entity();
        entity.replace_cids(cids(&["m:b", "m:a"]));
        entity.union_cids(cids(&["m:b", "m:d", "m:c"]));
        assert_eq!(entity.channel_cids, cids(&["m:a", "m:b", "m:d", "m:c"]));
    }

    #[test]
    fn test_prepend_moves_to_front() {
        let mut entity = entity();
        entity.replace_cids(cids(&["m:a", "m:b", "m:c"]));
        entity.prepend_cids(cids(&["m:c", "m:z"]));
        assert_eq!(entity.channel_cids, cids(&["m:c", "m:z", "m:a", "m:b"]));
    }

    #[test]
    fn test_identity_follows_query() {
        let a = entity();
        let b = QueryChannelsEntity::new(FilterObject::eq("type", "messaging"), QuerySort::new());
        assert_eq!(a.id, b.id);
    }
}
