//! 分页请求
//!
//! 下一页的 offset 由当前已发布的频道数量计算，而不是服务端游标：
//! 两次分页之间若有频道被删除，可能跳过条目（已知限制）。

use serde::{Deserialize, Serialize};

use crate::query::{FilterObject, QuerySort};

pub const DEFAULT_CHANNEL_LIMIT: u32 = 30;
pub const DEFAULT_MESSAGE_LIMIT: u32 = 10;

/// 查询分页参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChannelsPaginationRequest {
    pub sort: QuerySort,
    pub channel_offset: u32,
    pub channel_limit: u32,
    pub message_limit: u32,
}

impl QueryChannelsPaginationRequest {
    pub fn new(sort: QuerySort, channel_offset: u32, channel_limit: u32, message_limit: u32) -> Self {
        Self {
            sort,
            channel_offset,
            channel_limit,
            message_limit,
        }
    }

    /// 首页请求
    pub fn first_page(sort: QuerySort, channel_limit: u32, message_limit: u32) -> Self {
        Self::new(sort, 0, channel_limit, message_limit)
    }

    /// 以当前已有数量作为 offset 的下一页请求
    pub fn next_page(sort: QuerySort, current_size: usize, channel_limit: u32, message_limit: u32) -> Self {
        let offset = u32::try_from(current_size).unwrap_or(u32::MAX);
        Self::new(sort, offset, channel_limit, message_limit)
    }

    pub fn is_first_page(&self) -> bool {
        self.channel_offset == 0
    }

    /// 转换为发往服务端的查询请求
    pub fn to_query_channels_request(&self, filter: &FilterObject, user_presence: bool) -> QueryChannelsRequest {
        QueryChannelsRequest {
            filter: filter.clone(),
            sort: self.sort.clone(),
            offset: self.channel_offset,
            limit: self.channel_limit,
            message_limit: self.message_limit,
            watch: true,
            state: true,
            presence: user_presence,
        }
    }
}

/// 远端查询请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChannelsRequest {
    pub filter: FilterObject,
    pub sort: QuerySort,
    pub offset: u32,
    pub limit: u32,
    pub message_limit: u32,
    /// 订阅返回频道的实时事件
    pub watch: bool,
    /// 返回完整频道状态
    pub state: bool,
    /// 透传的用户在线状态开关
    pub presence: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_detection() {
        let sort = QuerySort::new().desc("last_message_at");
        assert!(QueryChannelsPaginationRequest::first_page(sort.clone(), 30, 10).is_first_page());
        let next = QueryChannelsPaginationRequest::next_page(sort, 30, 30, 10);
        assert!(!next.is_first_page());
        assert_eq!(next.channel_offset, 30);
    }

    #[test]
    fn test_next_page_from_empty_is_first_page() {
        let next = QueryChannelsPaginationRequest::next_page(QuerySort::new(), 0, 30, 10);
        assert!(next.is_first_page());
    }

    #[test]
    fn test_request_passes_presence_through() {
        let filter = FilterObject::eq("type", "messaging");
        let page = QueryChannelsPaginationRequest::new(QuerySort::new(), 20, 10, 5);
        let request = page.to_query_channels_request(&filter, true);
        assert_eq!(request.offset, 20);
        assert_eq!(request.limit, 10);
        assert_eq!(request.message_limit, 5);
        assert!(request.presence);
        assert!(request.watch && request.state);
        assert_eq!(request.filter, filter);
    }
}
