//! Records as the tracking service stores them.
//!
//! Every record has an [`EntityType`], an integer id, and a bag of fields.
//! Links to other records are stored as `{"type": "Shot", "id": 42}` objects,
//! and fields can be read across a link with the service's dotted syntax:
//! `sg_sequence.Sequence.code` is the `code` of the `Sequence` linked through
//! `sg_sequence`.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Field name to value.
pub type Fields = Map<String, Value>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Project,
    Sequence,
    Shot,
    Asset,
    Step,
    Task,
    Version,
    PublishedFile,
    PublishedFileType,
    HumanUser,
}
impl EntityType {
    /// Collection name in the REST API (`/api/v1/entity/<collection>`).
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Sequence => "sequences",
            Self::Shot => "shots",
            Self::Asset => "assets",
            Self::Step => "steps",
            Self::Task => "tasks",
            Self::Version => "versions",
            Self::PublishedFile => "published_files",
            Self::PublishedFileType => "published_file_types",
            Self::HumanUser => "human_users",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

/// Link to a record, serialized as `{"type": ..., "id": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: i64,
}
impl EntityRef {
    pub fn new(entity_type: EntityType, id: i64) -> Self {
        Self { entity_type, id }
    }

    /// Parse a link value. Extra keys (such as `name`) are ignored.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let entity_type = EntityType::from_name(object.get("type")?.as_str()?)?;
        Some(Self { entity_type, id: object.get("id")?.as_i64()? })
    }
}
impl From<EntityRef> for Value {
    fn from(link: EntityRef) -> Self {
        json!({ "type": link.entity_type, "id": link.id })
    }
}

/// One record returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity_type: EntityType,
    pub id: i64,
    pub fields: Fields,
}
impl Record {
    pub fn new(entity_type: EntityType, id: i64, fields: Fields) -> Self {
        Self { entity_type, id, fields }
    }

    pub fn link(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field, ignoring nulls and non-strings.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.as_str()
    }

    pub fn i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field)?.as_i64()
    }

    /// Field holding a link to another record.
    pub fn entity(&self, field: &str) -> Option<EntityRef> {
        EntityRef::from_value(self.fields.get(field)?)
    }
}

/// How a filter compares the field to its value.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    #[display("is")]
    Is,
    #[display("is_not")]
    IsNot,
}

/// `[field, relation, value]` condition. All filters in a query must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub relation: Relation,
    pub value: Value,
}
impl Filter {
    pub fn is(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), relation: Relation::Is, value: value.into() }
    }

    pub fn is_not(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), relation: Relation::IsNot, value: value.into() }
    }

    /// Wire form: `["field", "is", value]`.
    pub fn to_value(&self) -> Value {
        json!([self.field, self.relation.to_string(), self.value])
    }
}

/// Sort key for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}
impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true }
    }

    /// REST `sort` parameter form: `field` or `-field`.
    pub fn to_param(&self) -> String {
        match self.descending {
            true => format!("-{}", self.field),
            false => self.field.clone(),
        }
    }
}
