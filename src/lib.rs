#[cfg(feature = "api")]
pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
pub mod validation;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, HasPool, routes};
    pub use crate::config::ServerConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        add_relationship_to_graph, adopt_ungrouped_relationships, check_health,
        create_ens_graph_tables, create_graph, create_relationship, delete_graph,
        delete_relationship, delete_relationship_by_names, get_graph, list_graphs,
        list_relationships, list_relationships_for_name, seed_demo_relationships, update_graph,
    };
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::models::{
        CreateGraphPayload, CreateRelationshipPayload, DeleteByNamesPayload, FriendRelationship,
        GraphDeleted, GraphId, GraphRelationshipPayload, GraphSummary, GraphWithRelationships,
        HealthReport, ListRelationshipsQuery, RelationshipDeleted, RelationshipId,
        UpdateGraphPayload,
    };
    pub use crate::validation::{NormalizedPair, normalize_pair};
}
