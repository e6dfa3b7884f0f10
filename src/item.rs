//! Identifiers and domain objects passed through the service.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a domain object; stored in the index id field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id out of a JSON value: strings as-is, numbers in decimal.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Either a full domain object or just its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexItem {
    Id(ObjectId),
    Object(Value),
}

impl IndexItem {
    pub fn id(&self) -> Option<&ObjectId> {
        match self {
            IndexItem::Id(id) => Some(id),
            IndexItem::Object(_) => None,
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self, IndexItem::Id(_))
    }
}

impl fmt::Display for IndexItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexItem::Id(id) => write!(f, "id {id}"),
            IndexItem::Object(value) => write!(f, "object {value}"),
        }
    }
}

impl From<ObjectId> for IndexItem {
    fn from(id: ObjectId) -> Self {
        IndexItem::Id(id)
    }
}

impl From<Value> for IndexItem {
    fn from(object: Value) -> Self {
        IndexItem::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_id_from_json() {
        assert_eq!(ObjectId::from_json(&json!("a-1")), Some(ObjectId::from("a-1")));
        assert_eq!(ObjectId::from_json(&json!(42)), Some(ObjectId::from(42u64)));
        assert_eq!(ObjectId::from_json(&json!("")), None);
        assert_eq!(ObjectId::from_json(&json!(null)), None);
    }

    #[test]
    fn test_item_display() {
        assert_eq!(IndexItem::Id(ObjectId::from(7u64)).to_string(), "id 7");
        assert!(IndexItem::Object(json!({"id": 1})).to_string().starts_with("object"));
    }
}
