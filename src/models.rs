use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::{self, NormalizedPair};

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

pub const DEFAULT_ADOPTION_GRAPH_NAME: &str = "Default Graph";
pub const DEFAULT_ADOPTION_GRAPH_DESCRIPTION: &str =
    "Automatically created for existing relationships";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct GraphId(pub i64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<i64> for GraphId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RelationshipId(pub i64);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelationshipId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<i64> for RelationshipId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An undirected edge. `ens_name_1 < ens_name_2` always holds for stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRelationship {
    pub id: RelationshipId,
    pub ens_name_1: String,
    pub ens_name_2: String,
    pub graph_id: Option<GraphId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FriendRelationship {
    pub fn involves(&self, ens_name: &str) -> bool {
        self.ens_name_1 == ens_name || self.ens_name_2 == ens_name
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: GraphId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub relationship_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphWithRelationships {
    pub id: GraphId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub relationship_count: i64,
    pub relationships: Vec<FriendRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipPayload {
    #[serde(alias = "ens_name_1")]
    pub ens_name_1: String,
    #[serde(alias = "ens_name_2")]
    pub ens_name_2: String,
    #[serde(default, alias = "graph_id")]
    pub graph_id: Option<GraphId>,
}

/// Body for adding a pair to a graph named in the path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationshipPayload {
    #[serde(alias = "ens_name_1")]
    pub ens_name_1: String,
    #[serde(alias = "ens_name_2")]
    pub ens_name_2: String,
}

/// Deletion by names comes either as a JSON body or as query parameters;
/// both deserialize into this shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteByNamesPayload {
    #[serde(default, alias = "ens_name_1")]
    pub ens_name_1: Option<String>,
    #[serde(default, alias = "ens_name_2")]
    pub ens_name_2: Option<String>,
    #[serde(default, alias = "graph_id")]
    pub graph_id: Option<GraphId>,
}

impl DeleteByNamesPayload {
    pub fn normalize(&self) -> Result<NormalizedPair> {
        validation::require_pair(self.ens_name_1.as_deref(), self.ens_name_2.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGraphPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGraphPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDefinition {
    pub name: String,
    pub description: Option<String>,
}

impl CreateGraphPayload {
    pub fn normalize(self) -> Result<GraphDefinition> {
        normalize_graph_definition(self.name, self.description)
    }
}

impl UpdateGraphPayload {
    pub fn normalize(self) -> Result<GraphDefinition> {
        normalize_graph_definition(self.name, self.description)
    }
}

fn normalize_graph_definition(name: String, description: Option<String>) -> Result<GraphDefinition> {
    Ok(GraphDefinition {
        name: validation::normalize_graph_name(&name)?,
        description: validation::normalize_description(description),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRelationshipsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListRelationshipsQuery {
    pub fn pagination(&self) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = self.offset.unwrap_or(0);
        (limit, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDeleted {
    pub message: &'static str,
    pub deleted_id: RelationshipId,
    pub ens_name_1: String,
    pub ens_name_2: String,
    pub graph_id: Option<GraphId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDeleted {
    pub message: &'static str,
    pub deleted_id: GraphId,
    pub relationships_removed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub database: DatabaseStatus,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_database(database: DatabaseStatus) -> Self {
        let status = match database {
            DatabaseStatus::Connected => ServiceStatus::Healthy,
            DatabaseStatus::Disconnected => ServiceStatus::Degraded,
        };
        Self {
            status,
            database,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        CreateGraphPayload, CreateRelationshipPayload, DatabaseStatus, DeleteByNamesPayload,
        GraphId, HealthReport, ListRelationshipsQuery, MAX_LIST_LIMIT,
    };

    #[test]
    fn relationship_payload_accepts_snake_and_camel_case() {
        let snake: CreateRelationshipPayload = serde_json::from_value(json!({
            "ens_name_1": "nick.eth",
            "ens_name_2": "vitalik.eth",
            "graph_id": 4
        }))
        .expect("snake case payload");
        assert_eq!(snake.graph_id, Some(GraphId(4)));

        let camel: CreateRelationshipPayload = serde_json::from_value(json!({
            "ensName1": "nick.eth",
            "ensName2": "vitalik.eth"
        }))
        .expect("camel case payload");
        assert_eq!(camel.ens_name_1, "nick.eth");
        assert_eq!(camel.graph_id, None);
    }

    #[test]
    fn delete_payload_requires_both_names() {
        let payload: DeleteByNamesPayload =
            serde_json::from_value(json!({ "ens_name_1": "nick.eth" })).expect("partial payload");
        let err = payload.normalize().expect_err("missing second name");
        assert_eq!(err.code, "ens_names_required");
    }

    #[test]
    fn graph_payload_normalizes_name_and_description() {
        let payload = CreateGraphPayload {
            name: "  g1  ".to_string(),
            description: Some("  ".to_string()),
        };
        let definition = payload.normalize().expect("valid graph");
        assert_eq!(definition.name, "g1");
        assert_eq!(definition.description, None);
    }

    #[test]
    fn list_pagination_defaults_and_clamps() {
        assert_eq!(ListRelationshipsQuery::default().pagination(), (100, 0));
        let query = ListRelationshipsQuery {
            limit: Some(0),
            offset: Some(20),
        };
        assert_eq!(query.pagination(), (1, 20));
        let query = ListRelationshipsQuery {
            limit: Some(50_000),
            offset: None,
        };
        assert_eq!(query.pagination(), (MAX_LIST_LIMIT, 0));
    }

    #[test]
    fn health_report_degrades_without_database() {
        let report = HealthReport::from_database(DatabaseStatus::Disconnected);
        let value = serde_json::to_value(&report).expect("serializable");
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["database"], "disconnected");
        assert!(value["timestamp"].is_string());
    }
}
