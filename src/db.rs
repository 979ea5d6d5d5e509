use anyhow::anyhow;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::{ErrorKind, LibError, Result, classify_db_error};
use crate::models::{
    CreateGraphPayload, DatabaseStatus, FriendRelationship, GraphDefinition, GraphDeleted,
    GraphId, GraphSummary, GraphWithRelationships, HealthReport, RelationshipDeleted,
    RelationshipId, UpdateGraphPayload,
};
use crate::validation::{self, NormalizedPair};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_ens_graph_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Pairs inserted by [`seed_demo_relationships`] into an empty store.
pub const DEMO_RELATIONSHIPS: &[(&str, &str)] = &[
    ("nick.eth", "vitalik.eth"),
    ("brantly.eth", "vitalik.eth"),
    ("brantly.eth", "nick.eth"),
];

#[derive(Debug, Clone, FromRow)]
struct GraphRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct GraphSummaryRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    relationship_count: i64,
}

#[derive(Debug, Clone, FromRow)]
struct RelationshipRow {
    id: i64,
    ens_name_1: String,
    ens_name_2: String,
    graph_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GraphSummaryRow> for GraphSummary {
    fn from(value: GraphSummaryRow) -> Self {
        Self {
            id: GraphId(value.id),
            name: value.name,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
            relationship_count: value.relationship_count,
        }
    }
}

impl From<RelationshipRow> for FriendRelationship {
    fn from(value: RelationshipRow) -> Self {
        Self {
            id: RelationshipId(value.id),
            ens_name_1: value.ens_name_1,
            ens_name_2: value.ens_name_2,
            graph_id: value.graph_id.map(GraphId),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

fn summarize(row: GraphRow, relationship_count: i64) -> GraphSummary {
    GraphSummary {
        id: GraphId(row.id),
        name: row.name,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
        relationship_count,
    }
}

fn hydrate_graph(row: GraphRow, relationships: Vec<RelationshipRow>) -> GraphWithRelationships {
    GraphWithRelationships {
        id: GraphId(row.id),
        name: row.name,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
        relationship_count: relationships.len() as i64,
        relationships: relationships
            .into_iter()
            .map(FriendRelationship::from)
            .collect(),
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    classify_db_error(public, err)
}

/// Like [`db_err`], but a unique violation raised by a racing writer gets the
/// same message as the pre-checked conflict.
fn write_err(public: &'static str, conflict: &'static str, err: sqlx::Error) -> LibError {
    let err = classify_db_error(public, err);
    match err.kind {
        ErrorKind::Conflict => LibError {
            public: conflict,
            ..err
        },
        _ => err,
    }
}

fn graph_not_found(graph_id: GraphId) -> LibError {
    LibError::not_found("Graph not found", anyhow!("graph {} not found", graph_id))
}

async fn begin(pool: &PgPool) -> Result<Transaction<'static, Postgres>> {
    pool.begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))
}

/// Refreshes `updated_at` on a graph whose relationships changed. Also serves
/// as the existence check, since it locks the graph row for the rest of the
/// transaction.
async fn touch_graph(tx: &mut Transaction<'_, Postgres>, graph_id: GraphId) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE ens.graphs
        SET updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(graph_id.0)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to update graph", err))?;

    Ok(result.rows_affected() > 0)
}

/// Takes the graph row lock. Every path that writes relationships of a graph
/// locks the graph first, matching the order of the delete cascade.
async fn lock_graph(tx: &mut Transaction<'_, Postgres>, graph_id: GraphId) -> Result<bool> {
    let locked: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM ens.graphs
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(graph_id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to lock graph", err))?;

    Ok(locked.is_some())
}

async fn graph_name_taken(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    except: Option<GraphId>,
) -> Result<bool> {
    let taken: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM ens.graphs
            WHERE name = $1
              AND ($2::bigint IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(name)
    .bind(except.map(|id| id.0))
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to query graph", err))?;

    Ok(taken.0)
}

async fn insert_relationship(
    tx: &mut Transaction<'_, Postgres>,
    pair: &NormalizedPair,
    graph_id: Option<GraphId>,
) -> Result<FriendRelationship> {
    let exists: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM ens.friend_relationships
            WHERE ens_name_1 = $1
              AND ens_name_2 = $2
              AND graph_id IS NOT DISTINCT FROM $3
        )
        "#,
    )
    .bind(&pair.ens_name_1)
    .bind(&pair.ens_name_2)
    .bind(graph_id.map(|id| id.0))
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to query relationship", err))?;

    if exists.0 {
        return Err(LibError::conflict(
            "Relationship already exists",
            anyhow!(
                "relationship between {} and {} already exists in scope {:?}",
                pair.ens_name_1,
                pair.ens_name_2,
                graph_id
            ),
        ));
    }

    let row = sqlx::query_as::<_, RelationshipRow>(
        r#"
        INSERT INTO ens.friend_relationships (ens_name_1, ens_name_2, graph_id)
        VALUES ($1, $2, $3)
        RETURNING id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
        "#,
    )
    .bind(&pair.ens_name_1)
    .bind(&pair.ens_name_2)
    .bind(graph_id.map(|id| id.0))
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| {
        write_err(
            "Failed to create relationship",
            "Relationship already exists",
            err,
        )
    })?;

    Ok(FriendRelationship::from(row))
}

/// Creates an undirected relationship, optionally scoped to a graph.
pub async fn create_relationship(
    pool: &PgPool,
    ens_name_1: &str,
    ens_name_2: &str,
    graph_id: Option<GraphId>,
) -> Result<FriendRelationship> {
    let pair = validation::normalize_pair(ens_name_1, ens_name_2)?;

    let mut tx = begin(pool).await?;
    if let Some(graph_id) = graph_id {
        if !touch_graph(&mut tx, graph_id).await? {
            return Err(graph_not_found(graph_id));
        }
    }
    let relationship = insert_relationship(&mut tx, &pair, graph_id).await?;
    commit(tx).await?;

    tracing::debug!(
        relationship_id = %relationship.id,
        graph_id = ?relationship.graph_id,
        "created relationship"
    );
    Ok(relationship)
}

/// Adds a pair to an existing graph. Unlike [`create_relationship`] the scope
/// is mandatory.
pub async fn add_relationship_to_graph(
    pool: &PgPool,
    graph_id: GraphId,
    ens_name_1: &str,
    ens_name_2: &str,
) -> Result<FriendRelationship> {
    create_relationship(pool, ens_name_1, ens_name_2, Some(graph_id)).await
}

pub async fn list_relationships(
    pool: &PgPool,
    limit: u32,
    offset: u32,
) -> Result<Vec<FriendRelationship>> {
    let rows = sqlx::query_as::<_, RelationshipRow>(
        r#"
        SELECT id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
        FROM ens.friend_relationships
        ORDER BY id ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Database connection error", err))?;

    Ok(rows.into_iter().map(FriendRelationship::from).collect())
}

/// Every relationship, in any scope, that has `ens_name` as an endpoint.
///
/// An empty result is reported as `NotFound`, not as an empty list; existing
/// clients depend on the 404.
pub async fn list_relationships_for_name(
    pool: &PgPool,
    ens_name: &str,
) -> Result<Vec<FriendRelationship>> {
    let ens_name = validation::normalize_ens_name(ens_name)?;

    let rows = sqlx::query_as::<_, RelationshipRow>(
        r#"
        SELECT id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
        FROM ens.friend_relationships
        WHERE ens_name_1 = $1
           OR ens_name_2 = $1
        ORDER BY id ASC
        "#,
    )
    .bind(&ens_name)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to query relationships", err))?;

    if rows.is_empty() {
        return Err(LibError::not_found(
            "No relationships found for this ENS name",
            anyhow!("no relationships found for {}", ens_name),
        ));
    }

    Ok(rows.into_iter().map(FriendRelationship::from).collect())
}

async fn finish_relationship_delete(
    mut tx: Transaction<'_, Postgres>,
    row: RelationshipRow,
) -> Result<RelationshipDeleted> {
    if let Some(graph_id) = row.graph_id {
        touch_graph(&mut tx, GraphId(graph_id)).await?;
    }
    commit(tx).await?;

    tracing::debug!(relationship_id = row.id, "deleted relationship");
    Ok(RelationshipDeleted {
        message: "Relationship deleted successfully",
        deleted_id: RelationshipId(row.id),
        ens_name_1: row.ens_name_1,
        ens_name_2: row.ens_name_2,
        graph_id: row.graph_id.map(GraphId),
    })
}

fn relationship_not_found(relationship_id: RelationshipId) -> LibError {
    LibError::not_found(
        "Relationship not found",
        anyhow!("relationship {} not found", relationship_id),
    )
}

pub async fn delete_relationship(
    pool: &PgPool,
    relationship_id: RelationshipId,
) -> Result<RelationshipDeleted> {
    let mut tx = begin(pool).await?;

    // The scope is read unlocked so the graph row can be locked before the
    // relationship row. Adoption can move an ungrouped row into a graph in
    // between; the scoped DELETE then misses and the scope is read again.
    loop {
        let scope: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            SELECT graph_id
            FROM ens.friend_relationships
            WHERE id = $1
            "#,
        )
        .bind(relationship_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to query relationship", err))?;

        let Some((graph_id,)) = scope else {
            return Err(relationship_not_found(relationship_id));
        };

        if let Some(graph_id) = graph_id {
            // A vanished graph took the relationship with it.
            if !lock_graph(&mut tx, GraphId(graph_id)).await? {
                return Err(relationship_not_found(relationship_id));
            }
        }

        let row = sqlx::query_as::<_, RelationshipRow>(
            r#"
            DELETE FROM ens.friend_relationships
            WHERE id = $1
              AND graph_id IS NOT DISTINCT FROM $2
            RETURNING id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
            "#,
        )
        .bind(relationship_id.0)
        .bind(graph_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to delete relationship", err))?;

        if let Some(row) = row {
            return finish_relationship_delete(tx, row).await;
        }
    }
}

/// Deletes the pair from exactly one scope; `graph_id = None` targets the
/// ungrouped relationships.
pub async fn delete_relationship_by_names(
    pool: &PgPool,
    ens_name_1: &str,
    ens_name_2: &str,
    graph_id: Option<GraphId>,
) -> Result<RelationshipDeleted> {
    let pair = validation::normalize_pair(ens_name_1, ens_name_2)?;
    let missing = || {
        LibError::not_found(
            "Relationship not found",
            anyhow!(
                "relationship between {} and {} not found in scope {:?}",
                pair.ens_name_1,
                pair.ens_name_2,
                graph_id
            ),
        )
    };

    let mut tx = begin(pool).await?;

    if let Some(graph_id) = graph_id {
        if !lock_graph(&mut tx, graph_id).await? {
            return Err(missing());
        }
    }

    let row = sqlx::query_as::<_, RelationshipRow>(
        r#"
        DELETE FROM ens.friend_relationships
        WHERE ens_name_1 = $1
          AND ens_name_2 = $2
          AND graph_id IS NOT DISTINCT FROM $3
        RETURNING id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
        "#,
    )
    .bind(&pair.ens_name_1)
    .bind(&pair.ens_name_2)
    .bind(graph_id.map(|id| id.0))
    .fetch_optional(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to delete relationship", err))?;

    let Some(row) = row else {
        return Err(missing());
    };

    finish_relationship_delete(tx, row).await
}

async fn insert_graph(
    tx: &mut Transaction<'_, Postgres>,
    definition: &GraphDefinition,
) -> Result<GraphRow> {
    if graph_name_taken(tx, &definition.name, None).await? {
        return Err(LibError::conflict(
            "Graph name already exists",
            anyhow!("graph named {:?} already exists", definition.name),
        ));
    }

    sqlx::query_as::<_, GraphRow>(
        r#"
        INSERT INTO ens.graphs (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(&definition.name)
    .bind(&definition.description)
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| write_err("Failed to create graph", "Graph name already exists", err))
}

pub async fn create_graph(pool: &PgPool, payload: CreateGraphPayload) -> Result<GraphSummary> {
    let definition = payload.normalize()?;

    let mut tx = begin(pool).await?;
    let row = insert_graph(&mut tx, &definition).await?;
    commit(tx).await?;

    tracing::info!(graph_id = row.id, name = %row.name, "created graph");
    Ok(summarize(row, 0))
}

pub async fn get_graph(pool: &PgPool, graph_id: GraphId) -> Result<GraphWithRelationships> {
    let mut tx = begin(pool).await?;

    let graph = sqlx::query_as::<_, GraphRow>(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM ens.graphs
        WHERE id = $1
        "#,
    )
    .bind(graph_id.0)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to query graph", err))?
    .ok_or_else(|| graph_not_found(graph_id))?;

    let relationships = sqlx::query_as::<_, RelationshipRow>(
        r#"
        SELECT id, ens_name_1, ens_name_2, graph_id, created_at, updated_at
        FROM ens.friend_relationships
        WHERE graph_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(graph_id.0)
    .fetch_all(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to query graph relationships", err))?;

    commit(tx).await?;
    Ok(hydrate_graph(graph, relationships))
}

pub async fn list_graphs(pool: &PgPool) -> Result<Vec<GraphSummary>> {
    let rows = sqlx::query_as::<_, GraphSummaryRow>(
        r#"
        SELECT
            g.id,
            g.name,
            g.description,
            g.created_at,
            g.updated_at,
            COALESCE(r.relationship_count, 0) AS relationship_count
        FROM ens.graphs g
        LEFT JOIN (
            SELECT graph_id, COUNT(*)::bigint AS relationship_count
            FROM ens.friend_relationships
            WHERE graph_id IS NOT NULL
            GROUP BY graph_id
        ) r
        ON r.graph_id = g.id
        ORDER BY g.created_at DESC, g.id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list graphs", err))?;

    Ok(rows.into_iter().map(GraphSummary::from).collect())
}

async fn count_graph_relationships(
    tx: &mut Transaction<'_, Postgres>,
    graph_id: GraphId,
) -> Result<i64> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)::bigint
        FROM ens.friend_relationships
        WHERE graph_id = $1
        "#,
    )
    .bind(graph_id.0)
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to count graph relationships", err))?;

    Ok(count.0)
}

pub async fn update_graph(
    pool: &PgPool,
    graph_id: GraphId,
    payload: UpdateGraphPayload,
) -> Result<GraphSummary> {
    let definition = payload.normalize()?;

    let mut tx = begin(pool).await?;

    if graph_name_taken(&mut tx, &definition.name, Some(graph_id)).await? {
        return Err(LibError::conflict(
            "Graph name already exists",
            anyhow!(
                "graph named {:?} already exists besides {}",
                definition.name,
                graph_id
            ),
        ));
    }

    let row = sqlx::query_as::<_, GraphRow>(
        r#"
        UPDATE ens.graphs
        SET name = $1,
            description = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        RETURNING id, name, description, created_at, updated_at
        "#,
    )
    .bind(&definition.name)
    .bind(&definition.description)
    .bind(graph_id.0)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|err| write_err("Failed to update graph", "Graph name already exists", err))?
    .ok_or_else(|| graph_not_found(graph_id))?;

    let relationship_count = count_graph_relationships(&mut tx, graph_id).await?;
    commit(tx).await?;

    tracing::info!(graph_id = row.id, name = %row.name, "updated graph");
    Ok(summarize(row, relationship_count))
}

/// Deletes a graph. Its relationships go with it through the
/// `ON DELETE CASCADE` foreign key, inside the same transaction.
pub async fn delete_graph(pool: &PgPool, graph_id: GraphId) -> Result<GraphDeleted> {
    let mut tx = begin(pool).await?;

    if !lock_graph(&mut tx, graph_id).await? {
        return Err(graph_not_found(graph_id));
    }

    let relationships_removed = count_graph_relationships(&mut tx, graph_id).await?;

    sqlx::query(
        r#"
        DELETE FROM ens.graphs
        WHERE id = $1
        "#,
    )
    .bind(graph_id.0)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to delete graph", err))?;

    commit(tx).await?;

    tracing::info!(
        graph_id = graph_id.0,
        relationships_removed,
        "deleted graph"
    );
    Ok(GraphDeleted {
        message: "Graph deleted successfully",
        deleted_id: graph_id,
        relationships_removed,
    })
}

/// Pings the store. Connectivity problems degrade the report instead of
/// failing it.
pub async fn check_health(pool: &PgPool) -> HealthReport {
    let database = match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => DatabaseStatus::Connected,
        Err(err) => {
            tracing::warn!(error = %err, "database health check failed");
            DatabaseStatus::Disconnected
        }
    };
    HealthReport::from_database(database)
}

/// Inserts [`DEMO_RELATIONSHIPS`] as ungrouped relationships when the store
/// holds no relationships at all. Returns how many rows were inserted.
pub async fn seed_demo_relationships(pool: &PgPool) -> Result<u64> {
    let mut tx = begin(pool).await?;

    let populated: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM ens.friend_relationships
        )
        "#,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to query relationships", err))?;

    if populated.0 {
        tracing::info!("relationships already present, skipping demo seed");
        return Ok(0);
    }

    let mut inserted = 0;
    for (ens_name_1, ens_name_2) in DEMO_RELATIONSHIPS {
        let pair = validation::normalize_pair(ens_name_1, ens_name_2)?;
        insert_relationship(&mut tx, &pair, None).await?;
        inserted += 1;
    }
    commit(tx).await?;

    tracing::info!(inserted, "seeded demo relationships");
    Ok(inserted)
}

/// Moves every ungrouped relationship into a newly created graph.
///
/// Returns `None` without creating the graph when nothing is ungrouped.
pub async fn adopt_ungrouped_relationships(
    pool: &PgPool,
    payload: CreateGraphPayload,
) -> Result<Option<GraphSummary>> {
    let definition = payload.normalize()?;

    let mut tx = begin(pool).await?;

    let ungrouped: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)::bigint
        FROM ens.friend_relationships
        WHERE graph_id IS NULL
        "#,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to count ungrouped relationships", err))?;

    if ungrouped.0 == 0 {
        tracing::info!("no ungrouped relationships to adopt");
        return Ok(None);
    }

    let graph = insert_graph(&mut tx, &definition).await?;

    let adopted = sqlx::query(
        r#"
        UPDATE ens.friend_relationships
        SET graph_id = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE graph_id IS NULL
        "#,
    )
    .bind(graph.id)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to adopt ungrouped relationships", err))?
    .rows_affected();

    commit(tx).await?;

    tracing::info!(graph_id = graph.id, adopted, "adopted ungrouped relationships");
    Ok(Some(summarize(graph, adopted as i64)))
}
