//! 频道类型配置数据访问层

use rusqlite::{params, Connection};
use crate::error::Result;
use crate::storage::entities::ChannelConfigEntity;

pub struct ChannelConfigDao<'a> {
    conn: &'a Connection,
}

impl<'a> ChannelConfigDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, entity: &ChannelConfigEntity) -> Result<()> {
        let sql = r#"
            INSERT INTO channel_config (channel_type, config, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(channel_type) DO UPDATE SET
                config = excluded.config,
                updated_at = excluded.updated_at
        "#;
        let config = serde_json::to_string(&entity.config)?;
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(sql, params![entity.channel_type, config, now])?;
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<ChannelConfigEntity>> {
        let mut stmt = self.conn.prepare("SELECT channel_type, config FROM channel_config ORDER BY channel_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut configs = Vec::new();
        for row in rows {
            let (channel_type, config) = row?;
            configs.push(ChannelConfigEntity {
                channel_type,
                config: serde_json::from_str(&config)?,
            });
        }
        Ok(configs)
    }
}
