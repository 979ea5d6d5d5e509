use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::json;

use crate::db;
use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateGraphPayload, CreateRelationshipPayload, DeleteByNamesPayload, GraphId,
    GraphRelationshipPayload, ListRelationshipsQuery, RelationshipId, UpdateGraphPayload,
};

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        };

        if self.0.is_client_error() {
            tracing::warn!(kind = ?self.0.kind, error = %self.0.source, "ens graph request rejected");
        } else {
            tracing::error!(kind = ?self.0.kind, error = %self.0.source, "ens graph request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.0.code,
                "message": self.0.public,
            }
        }));
        (status, body).into_response()
    }
}

pub trait HasPool {
    fn pool(&self) -> Arc<sqlx::PgPool>;
}

async fn health_handler<S>(State(app): State<S>) -> impl IntoResponse
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    Json(db::check_health(&app.pool()).await)
}

async fn list_relationships_handler<S>(
    State(app): State<S>,
    Query(query): Query<ListRelationshipsQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let (limit, offset) = query.pagination();
    let relationships = db::list_relationships(&app.pool(), limit, offset).await?;
    Ok(Json(relationships))
}

async fn create_relationship_handler<S>(
    State(app): State<S>,
    Json(payload): Json<CreateRelationshipPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let relationship = db::create_relationship(
        &app.pool(),
        &payload.ens_name_1,
        &payload.ens_name_2,
        payload.graph_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(relationship)))
}

async fn relationships_for_name_handler<S>(
    State(app): State<S>,
    Path(ens_name): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let relationships = db::list_relationships_for_name(&app.pool(), &ens_name).await?;
    Ok(Json(relationships))
}

async fn delete_relationship_handler<S>(
    State(app): State<S>,
    Path(relationship_id): Path<RelationshipId>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let deleted = db::delete_relationship(&app.pool(), relationship_id).await?;
    Ok(Json(deleted))
}

async fn delete_by_names<S>(app: S, payload: DeleteByNamesPayload) -> Result<Response, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let pair = payload.normalize()?;
    let deleted = db::delete_relationship_by_names(
        &app.pool(),
        &pair.ens_name_1,
        &pair.ens_name_2,
        payload.graph_id,
    )
    .await?;
    Ok(Json(deleted).into_response())
}

async fn delete_by_names_query_handler<S>(
    State(app): State<S>,
    Query(payload): Query<DeleteByNamesPayload>,
) -> Result<Response, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    delete_by_names(app, payload).await
}

async fn delete_by_names_body_handler<S>(
    State(app): State<S>,
    Json(payload): Json<DeleteByNamesPayload>,
) -> Result<Response, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    delete_by_names(app, payload).await
}

async fn list_graphs_handler<S>(State(app): State<S>) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let graphs = db::list_graphs(&app.pool()).await?;
    Ok(Json(graphs))
}

async fn create_graph_handler<S>(
    State(app): State<S>,
    Json(payload): Json<CreateGraphPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let graph = db::create_graph(&app.pool(), payload).await?;
    Ok((StatusCode::CREATED, Json(graph)))
}

async fn get_graph_handler<S>(
    State(app): State<S>,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let graph = db::get_graph(&app.pool(), graph_id).await?;
    Ok(Json(graph))
}

async fn update_graph_handler<S>(
    State(app): State<S>,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<UpdateGraphPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let graph = db::update_graph(&app.pool(), graph_id, payload).await?;
    Ok(Json(graph))
}

async fn delete_graph_handler<S>(
    State(app): State<S>,
    Path(graph_id): Path<GraphId>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let deleted = db::delete_graph(&app.pool(), graph_id).await?;
    Ok(Json(deleted))
}

async fn add_graph_relationship_handler<S>(
    State(app): State<S>,
    Path(graph_id): Path<GraphId>,
    Json(payload): Json<GraphRelationshipPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    let relationship = db::add_relationship_to_graph(
        &app.pool(),
        graph_id,
        &payload.ens_name_1,
        &payload.ens_name_2,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(relationship)))
}

pub fn routes<S>() -> Router<S>
where
    S: HasPool + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /health [GET]");
    tracing::info!("Registering route /api/relationships [GET,POST]");
    tracing::info!("Registering route /api/relationships/delete-by-names [DELETE]");
    tracing::info!("Registering route /api/relationships/by-names [DELETE]");
    tracing::info!("Registering route /api/relationships/{{ens_name_or_id}} [GET,DELETE]");
    tracing::info!("Registering route /api/graphs [GET,POST]");
    tracing::info!("Registering route /api/graphs/{{graph_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /api/graphs/{{graph_id}}/relationships [POST]");

    Router::new()
        .route("/health", get(health_handler::<S>))
        .route(
            "/api/relationships",
            get(list_relationships_handler::<S>).post(create_relationship_handler::<S>),
        )
        .route(
            "/api/relationships/delete-by-names",
            delete(delete_by_names_query_handler::<S>),
        )
        .route(
            "/api/relationships/by-names",
            delete(delete_by_names_body_handler::<S>),
        )
        // GET takes an ENS name, DELETE takes a numeric relationship id.
        // The static `delete-by-names` and `by-names` segments above win over
        // this capture, so those two literals are never looked up as names
        // and `GET` on them answers 405. Real ENS names carry a dotted suffix.
        .route(
            "/api/relationships/{ens_name_or_id}",
            get(relationships_for_name_handler::<S>).delete(delete_relationship_handler::<S>),
        )
        .route(
            "/api/graphs",
            get(list_graphs_handler::<S>).post(create_graph_handler::<S>),
        )
        .route(
            "/api/graphs/{graph_id}",
            get(get_graph_handler::<S>)
                .put(update_graph_handler::<S>)
                .delete(delete_graph_handler::<S>),
        )
        .route(
            "/api/graphs/{graph_id}/relationships",
            post(add_graph_relationship_handler::<S>),
        )
}
