//! 数据库 Actor - 单线程数据库访问模型
//!
//! - SQLite Connection 永远只在一个专用线程中
//! - 所有数据库操作通过 channel 发送命令，结果经 oneshot 返回
//! - 所有 DbActorHandle 被 drop 后线程自动退出

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::Connection;
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::{QueryChannelsError, Result};
use crate::storage::channel_store::ChannelRecordStore;
use crate::storage::dao::{ChannelConfigDao, ChannelDao, TransactionManager};
use crate::storage::entities::{ChannelConfigEntity, ChannelEntity};

/// 数据库命令
pub enum DbCommand {
    /// 打开数据库（None 表示内存数据库）
    Init {
        db_path: Option<PathBuf>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    InsertChannels {
        channels: Vec<ChannelEntity>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    SelectChannels {
        cids: Vec<String>,
        respond_to: oneshot::Sender<Result<Vec<ChannelEntity>>>,
    },
    DeleteChannel {
        cid: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    InsertConfigs {
        configs: Vec<ChannelConfigEntity>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    SelectConfigs {
        respond_to: oneshot::Sender<Result<Vec<ChannelConfigEntity>>>,
    },
    Shutdown,
}

pub struct DbActor {
    conn: Option<Connection>,
    receiver: Receiver<DbCommand>,
}

impl DbActor {
    fn new(receiver: Receiver<DbCommand>) -> Self {
        Self { conn: None, receiver }
    }

    fn run(mut self) {
        info!("[Thread {:?}] DbActor 开始处理命令", thread::current().id());

        while let Ok(command) = self.receiver.recv() {
            match command {
                DbCommand::Shutdown => {
                    info!("DbActor 收到停止信号");
                    break;
                }
                DbCommand::Init { db_path, respond_to } => {
                    let _ = respond_to.send(self.handle_init(db_path));
                }
                DbCommand::InsertChannels { channels, respond_to } => {
                    let _ = respond_to.send(self.handle_insert_channels(&channels));
                }
                DbCommand::SelectChannels { cids, respond_to } => {
                    let _ = respond_to.send(self.conn().and_then(|c| ChannelDao::new(c).get_by_cids(&cids)));
                }
                DbCommand::DeleteChannel { cid, respond_to } => {
                    let result = self.conn().and_then(|c| ChannelDao::new(c).delete(&cid).map(|_| ()));
                    let _ = respond_to.send(result);
                }
                DbCommand::InsertConfigs { configs, respond_to } => {
                    let _ = respond_to.send(self.handle_insert_configs(&configs));
                }
                DbCommand::SelectConfigs { respond_to } => {
                    let _ = respond_to.send(self.conn().and_then(|c| ChannelConfigDao::new(c).list_all()));
                }
            }
        }

        info!("DbActor 已停止");
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| QueryChannelsError::Database("数据库未初始化".to_string()))
    }

    fn handle_init(&mut self, db_path: Option<PathBuf>) -> Result<()> {
        if self.conn.is_some() {
            debug!("数据库已初始化，跳过");
            return Ok(());
        }

        let mut conn = match &db_path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| {
            error!("打开数据库失败: path={:?}, error={}", db_path, e);
            QueryChannelsError::Database(format!("打开数据库失败: {}", e))
        })?;

        crate::storage::migrate::init_db(&mut conn)?;
        info!("数据库初始化完成: path={:?}", db_path);

        self.conn = Some(conn);
        Ok(())
    }

    fn handle_insert_channels(&self, channels: &[ChannelEntity]) -> Result<()> {
        let conn = self.conn()?;
        TransactionManager::new(conn).execute(|conn| {
            let dao = ChannelDao::new(conn);
            for entity in channels {
                dao.upsert(entity)?;
            }
            Ok(())
        })?;
        debug!("已写入 {} 个频道", channels.len());
        Ok(())
    }

    fn handle_insert_configs(&self, configs: &[ChannelConfigEntity]) -> Result<()> {
        let conn = self.conn()?;
        TransactionManager::new(conn).execute(|conn| {
            let dao = ChannelConfigDao::new(conn);
            for entity in configs {
                dao.upsert(entity)?;
            }
            Ok(())
        })
    }
}

/// DB Actor 句柄
#[derive(Clone)]
pub struct DbActorHandle {
    sender: Sender<DbCommand>,
}

impl std::fmt::Debug for DbActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbActorHandle").finish_non_exhaustive()
    }
}

impl DbActorHandle {
    /// 启动专用线程
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = unbounded();

        thread::Builder::new()
            .name("db-actor".to_string())
            .spawn(move || DbActor::new(receiver).run())
            .map_err(|e| QueryChannelsError::Database(format!("无法启动 DB Actor 线程: {}", e)))?;

        Ok(Self { sender })
    }

    /// 启动并打开数据库
    pub async fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let handle = Self::spawn()?;
        handle
            .request(|respond_to| DbCommand::Init { db_path, respond_to })
            .await?;
        Ok(handle)
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(DbCommand::Shutdown);
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .map_err(|_| QueryChannelsError::ActorStopped)?;
        rx.await.map_err(|_| QueryChannelsError::ActorStopped)?
    }
}

#[async_trait]
impl ChannelRecordStore for DbActorHandle {
    async fn insert_channels(&self, channels: Vec<ChannelEntity>) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        self.request(|respond_to| DbCommand::InsertChannels { channels, respond_to })
            .await
    }

    async fn select_channels(&self, cids: Vec<String>) -> Result<Vec<ChannelEntity>> {
        self.request(|respond_to| DbCommand::SelectChannels { cids, respond_to })
            .await
    }

    async fn delete_channel(&self, cid: String) -> Result<()> {
        self.request(|respond_to| DbCommand::DeleteChannel { cid, respond_to })
            .await
    }

    async fn insert_configs(&self, configs: Vec<ChannelConfigEntity>) -> Result<()> {
        if configs.is_empty() {
            return Ok(());
        }
        self.request(|respond_to| DbCommand::InsertConfigs { configs, respond_to })
            .await
    }

    async fn select_configs(&self) -> Result<Vec<ChannelConfigEntity>> {
        self.request(|respond_to| DbCommand::SelectConfigs { respond_to })
            .await
    }
}
