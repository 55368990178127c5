//! 数据访问层 (DAO) - 每张表一个专门的操作模块

pub mod channel;
pub mod channel_config;

pub use channel::ChannelDao;
pub use channel_config::ChannelConfigDao;

use rusqlite::Connection;
use crate::error::{QueryChannelsError, Result};

/// 事务管理器 - 统一管理跨表操作的事务
pub struct TransactionManager<'a> {
    conn: &'a Connection,
}

impl<'a> TransactionManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 执行事务操作；闭包返回错误时事务随 drop 回滚
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let tx = self.conn.unchecked_transaction()
            .map_err(|e| QueryChannelsError::Database(format!("开始事务失败: {}", e)))?;

        let result = f(self.conn)?;

        tx.commit()
            .map_err(|e| QueryChannelsError::Database(format!("提交事务失败: {}", e)))?;

        Ok(result)
    }
}
