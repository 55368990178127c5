use std::fmt;

/// 正在进行中的查询阶段（用于拒绝重复请求）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// 首页加载
    FirstPage,
    /// 加载更多
    NextPage,
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPhase::FirstPage => write!(f, "first page"),
            QueryPhase::NextPage => write!(f, "next page"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryChannelsError {
    /// 已有查询在进行中，本次请求被直接拒绝（不排队、不重试）
    #[error("Another query channels request is in progress ({in_progress}). Ignoring this request.")]
    DuplicateInFlightQuery { in_progress: QueryPhase },

    /// 远端查询失败（网络或服务器错误），错误码原样透传
    #[error("Remote query failed [{code}]: {message}")]
    Remote { code: u32, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("KV store error: {0}")]
    KvStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    IO(String),

    #[error("Config error: {0}")]
    Config(String),

    /// DB Actor 线程已退出
    #[error("DB actor stopped")]
    ActorStopped,
}

impl From<serde_json::Error> for QueryChannelsError {
    fn from(error: serde_json::Error) -> Self {
        QueryChannelsError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for QueryChannelsError {
    fn from(error: std::io::Error) -> Self {
        QueryChannelsError::IO(error.to_string())
    }
}

impl From<sled::Error> for QueryChannelsError {
    fn from(error: sled::Error) -> Self {
        QueryChannelsError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for QueryChannelsError {
    fn from(error: reqwest::Error) -> Self {
        QueryChannelsError::Http(error.to_string())
    }
}

impl QueryChannelsError {
    /// 从远端响应创建错误
    pub fn from_remote(code: u32, message: impl Into<String>) -> Self {
        QueryChannelsError::Remote {
            code,
            message: message.into(),
        }
    }

    /// 获取远端错误码（如果这是一个远端错误）
    pub fn remote_code(&self) -> Option<u32> {
        match self {
            QueryChannelsError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// 判断是否因重复查询被拒绝
    pub fn is_duplicate_query(&self) -> bool {
        matches!(self, QueryChannelsError::DuplicateInFlightQuery { .. })
    }
}

pub type Result<T> = std::result::Result<T, QueryChannelsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_keeps_code() {
        let err = QueryChannelsError::from_remote(429, "rate limited");
        assert_eq!(err.remote_code(), Some(429));
        assert!(!err.is_duplicate_query());
        assert_eq!(err.to_string(), "Remote query failed [429]: rate limited");
    }

    #[test]
    fn test_duplicate_query_message() {
        let err = QueryChannelsError::DuplicateInFlightQuery {
            in_progress: QueryPhase::NextPage,
        };
        assert!(err.is_duplicate_query());
        assert_eq!(err.remote_code(), None);
        assert!(err.to_string().contains("next page"));
    }
}
