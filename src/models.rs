//! Rows exchanged by the registries, the HTTP API and the client

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{ApiError, Result};
use crate::fields::{MetadataSchema, MetadataValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Anything other than "admin" is an ordinary user
    pub fn from_db(value: &str) -> Self {
        if value == "admin" {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// The authenticated caller, re-read from storage on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            role: Role::from_db(&row.try_get::<String, _>("role")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub metadata_schema: MetadataSchema,
    pub is_official: bool,
    pub created_by: i64,
    pub creator_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Process {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let schema_json: String = row.try_get("metadata_schema")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            metadata_schema: serde_json::from_str(&schema_json)?,
            is_official: row.try_get::<i64, _>("is_official")? != 0,
            created_by: row.try_get("created_by")?,
            creator_name: row.try_get("creator_name")?,
            created_at: from_millis(row.try_get("created_at_ms")?)?,
        })
    }

    /// Creator, or any admin when the process is official
    pub fn can_edit(&self, user: &User) -> bool {
        self.created_by == user.id || (self.is_official && user.is_admin())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub process_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub metadata: MetadataValues,
    pub process_name: String,
    pub metadata_schema: MetadataSchema,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let metadata_json: String = row.try_get("metadata")?;
        let schema_json: String = row.try_get("metadata_schema")?;
        let end_time_ms: Option<i64> = row.try_get("end_time_ms")?;
        Ok(Self {
            id: row.try_get("id")?,
            process_id: row.try_get("process_id")?,
            user_id: row.try_get("user_id")?,
            start_time: from_millis(row.try_get("start_time_ms")?)?,
            end_time: end_time_ms.map(from_millis).transpose()?,
            duration_seconds: row.try_get("duration_seconds")?,
            metadata: serde_json::from_str(&metadata_json)?,
            process_name: row.try_get("process_name")?,
            metadata_schema: serde_json::from_str(&schema_json)?,
            created_at: from_millis(row.try_get("created_at_ms")?)?,
            updated_at: from_millis(row.try_get("updated_at_ms")?)?,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub total_instances: i64,
    pub total_seconds: i64,
    pub unique_processes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProcess {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata_schema: Option<MetadataSchema>,
    pub is_official: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProcess {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_schema: Option<MetadataSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartInstance {
    pub process_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataValues>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInstance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataValues>,
}

/// Query of `GET /instances`; an empty parameter counts as absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListInstances {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub process_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub offset: Option<i64>,
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("'{}': {}", text, e))),
    }
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ApiError::Internal(format!("timestamp out of range: {}", ms)))
}
