//! 查询描述与查询标识
//!
//! FilterObject 是不透明的 JSON 谓词描述，只用于生成缓存键和透传给服务端；
//! QueryIdentity = SHA-256(规范化 filter JSON | sort 描述)，逻辑上相同的查询得到相同的键。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// 过滤条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterObject(Value);

impl FilterObject {
    /// 空过滤（匹配全部）
    pub fn none() -> Self {
        Self(json!({}))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self(json!({ field: { "$eq": value.into() } }))
    }

    pub fn in_<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self(json!({ field: { "$in": values } }))
    }

    pub fn exists(field: &str, exists: bool) -> Self {
        Self(json!({ field: { "$exists": exists } }))
    }

    pub fn and(filters: Vec<FilterObject>) -> Self {
        Self(json!({ "$and": filters.into_iter().map(|f| f.0).collect::<Vec<_>>() }))
    }

    pub fn or(filters: Vec<FilterObject>) -> Self {
        Self(json!({ "$or": filters.into_iter().map(|f| f.0).collect::<Vec<_>>() }))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// 规范化 JSON：serde_json 的 Map 默认是 BTreeMap，序列化时 key 已排序
    pub fn canonical_json(&self) -> String {
        self.0.to_string()
    }
}

impl Default for FilterObject {
    fn default() -> Self {
        Self::none()
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_i8(self) -> i8 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// 排序描述（字段顺序有意义）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuerySort {
    pub fields: Vec<SortField>,
}

impl QuerySort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: &str) -> Self {
        self.fields.push(SortField {
            field: field.to_string(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn desc(mut self, field: &str) -> Self {
        self.fields.push(SortField {
            field: field.to_string(),
            direction: SortDirection::Desc,
        });
        self
    }

    /// 排序描述，如 "last_message_at:-1,cid:1"
    pub fn spec(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.field, f.direction.as_i8()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 查询标识（缓存键）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryIdentity(String);

impl QueryIdentity {
    pub fn new(filter: &FilterObject, sort: &QuerySort) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filter.canonical_json().as_bytes());
        hasher.update(b"|");
        hasher.update(sort.spec().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
