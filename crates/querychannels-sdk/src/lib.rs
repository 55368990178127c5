//! QueryChannels SDK - 离线优先的频道列表同步
//!
//! 对每个 (filter, sort) 查询维护一份本地缓存的频道列表：
//! - 先发布本地缓存，在线时再向服务端刷新并合并
//! - 分页加载，首页替换、后续页追加，不重复不丢失
//! - 实时事件增量更新已发布的列表，无需整体重新查询
//! - 同一查询同一时刻只允许一个网络请求
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use querychannels_sdk::{
//!     ConnectionStateManager, FilterObject, QueryChannelsConfig, QueryChannelsDomain, QuerySort,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QueryChannelsConfig::builder()
//!         .data_dir("/path/to/data")
//!         .api_base_url("https://chat.example.com/api")
//!         .build();
//!
//!     let connection = Arc::new(ConnectionStateManager::new());
//!     connection.mark_connected().await;
//!
//!     let domain = QueryChannelsDomain::open_http(config, connection).await?;
//!     let controller = domain.query_channels(
//!         FilterObject::eq("type", "messaging"),
//!         QuerySort::new().desc("last_message_at"),
//!     );
//!
//!     // 首页：先返回离线缓存，在线时刷新
//!     let channels = controller.query(30, 10).await?;
//!     println!("共 {} 个频道", channels.len());
//!
//!     // 下一页
//!     controller.load_more(30, 10).await?;
//!
//!     // 观察频道列表变化
//!     let mut receiver = controller.subscribe_channels();
//!     receiver.changed().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection_state;
pub mod controller;
pub mod domain;
pub mod error;
pub mod events;
pub mod http_client;
pub mod models;
pub mod observable;
pub mod pagination;
pub mod query;
pub mod repository;
pub mod router;
pub mod storage;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::QueryChannelsClient;
pub use config::{QueryChannelsConfig, QueryChannelsConfigBuilder};
pub use connection_state::{ConnectionState, ConnectionStateManager, ConnectionStatus, ConnectivityOracle};
pub use controller::{ChannelListSnapshot, ChannelPredicate, QueryChannelsController};
pub use domain::QueryChannelsDomain;
pub use error::{QueryChannelsError, QueryPhase, Result};
pub use events::{ChatEvent, EventBus, EventStats};
pub use http_client::HttpQueryChannelsClient;
pub use models::{Channel, ChannelConfig, Message};
pub use observable::Observable;
pub use pagination::{QueryChannelsPaginationRequest, QueryChannelsRequest};
pub use query::{FilterObject, QueryIdentity, QuerySort, SortDirection};
pub use repository::{ChannelEntityPair, ChannelStateRepository};
pub use router::EventRouter;
pub use version::{version_summary, SDK_VERSION};
