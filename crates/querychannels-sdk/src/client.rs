//! 远端查询客户端
//!
//! 控制器只依赖 `QueryChannelsClient`，默认的 HTTP 实现见 `http_client`。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Channel;
use crate::pagination::QueryChannelsRequest;

/// 远端频道查询
///
/// 失败时返回 `QueryChannelsError::Remote`（带错误码）或传输层错误，
/// 控制器原样透传给调用方。
#[async_trait]
pub trait QueryChannelsClient: Send + Sync {
    async fn query_channels(&self, request: QueryChannelsRequest) -> Result<Vec<Channel>>;
}
