//! 频道数据访问层 - 频道完整状态以 JSON 存储

use rusqlite::{params, Connection, OptionalExtension, Row};
use crate::error::{QueryChannelsError, Result};
use crate::storage::entities::ChannelEntity;

pub struct ChannelDao<'a> {
    conn: &'a Connection,
}

impl<'a> ChannelDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 插入或更新频道
    pub fn upsert(&self, entity: &ChannelEntity) -> Result<()> {
        let sql = r#"
            INSERT INTO channel (cid, channel_type, state, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cid) DO UPDATE SET
                channel_type = excluded.channel_type,
                state = excluded.state,
                updated_at = excluded.updated_at
        "#;
        let state = serde_json::to_string(&entity.state)?;
        self.conn.execute(sql, params![entity.cid, entity.channel_type, state, entity.updated_at])?;
        Ok(())
    }

    pub fn get_by_cid(&self, cid: &str) -> Result<Option<ChannelEntity>> {
        let sql = "SELECT cid, channel_type, state, updated_at FROM channel WHERE cid = ?1";
        let row = self
            .conn
            .query_row(sql, params![cid], Self::row_to_parts)
            .optional()?;
        row.map(Self::parts_to_entity).transpose()
    }

    /// 按 cid 批量查询，结果顺序与入参一致，不存在的 cid 直接跳过
    pub fn get_by_cids(&self, cids: &[String]) -> Result<Vec<ChannelEntity>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT cid, channel_type, state, updated_at FROM channel WHERE cid = ?1")?;
        let mut entities = Vec::with_capacity(cids.len());
        for cid in cids {
            let parts = stmt.query_row(params![cid], Self::row_to_parts).optional()?;
            if let Some(parts) = parts {
                entities.push(Self::parts_to_entity(parts)?);
            }
        }
        Ok(entities)
    }

    pub fn delete(&self, cid: &str) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM channel WHERE cid = ?1", params![cid])?;
        Ok(affected > 0)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM channel", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn row_to_parts(row: &Row) -> rusqlite::Result<(String, String, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn parts_to_entity(parts: (String, String, String, i64)) -> Result<ChannelEntity> {
        let (cid, channel_type, state, updated_at) = parts;
        let state = serde_json::from_str(&state)
            .map_err(|e| QueryChannelsError::Serialization(format!("解析频道 {} 失败: {}", cid, e)))?;
        Ok(ChannelEntity {
            cid,
            channel_type,
            state,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use crate::storage::migrate::init_db;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = conn();
        let dao = ChannelDao::new(&conn);
        let mut channel = Channel::new("messaging", "a").with_name("A");
        dao.upsert(&ChannelEntity::from_channel(&channel)).unwrap();

        channel.name = "A2".to_string();
        dao.upsert(&ChannelEntity::from_channel(&channel)).unwrap();

        let loaded = dao.get_by_cid("messaging:a").unwrap().unwrap();
        assert_eq!(loaded.state.name, "A2");
        assert_eq!(dao.count().unwrap(), 1);
        assert!(dao.get_by_cid("messaging:missing").unwrap().is_none());
    }

    #[test]
    fn test_get_by_cids_keeps_order_and_skips_missing() {
        let conn = conn();
        let dao = ChannelDao::new(&conn);
        for id in ["a", "b", "c"] {
            dao.upsert(&ChannelEntity::from_channel(&Channel::new("messaging", id))).unwrap();
        }
        let cids: Vec<String> = ["messaging:c", "messaging:x", "messaging:a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let loaded: Vec<_> = dao.get_by_cids(&cids).unwrap().into_iter().map(|e| e.cid).collect();
        assert_eq!(loaded, vec!["messaging:c", "messaging:a"]);

        assert!(dao.delete("messaging:c").unwrap());
        assert!(!dao.delete("messaging:c").unwrap());
    }
}
