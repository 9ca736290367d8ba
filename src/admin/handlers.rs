use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::admin::error::ApiError;
use crate::admin::AdminState;
use crate::endpoint::{Endpoint, EndpointAddr, NewEndpoint};
use crate::error::Error;
use crate::kv::Revision;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
    pub services: usize,
    pub registered_endpoints: usize,
}

/// AddConfig body. The descriptor set is either inline (base64) or a
/// blob store key.
#[derive(Debug, Deserialize)]
pub struct AddConfigRequest {
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub balance: String,
    pub endpoints: Vec<EndpointAddr>,
    #[serde(default)]
    pub descriptor_set: Option<String>,
    #[serde(default)]
    pub descriptor_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchRequest {
    pub fields: Map<String, Value>,
    pub mask: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutTagsRequest {
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Comma-separated tag filter.
    pub tags: Option<String>,
}

#[derive(Serialize)]
pub struct RouteView {
    pub path: String,
    pub verb: String,
    pub service: String,
    pub method: String,
    pub grpc_method: String,
    pub auth_required: bool,
    pub use_json_response: bool,
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub service: String,
    pub address: String,
    pub weight: u32,
    pub in_flight: usize,
}

#[derive(Serialize)]
pub struct ResyncResult {
    pub revision: Revision,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: state.routes.len(),
        services: state.registry.services().len(),
        registered_endpoints: state.reconciler.registered_keys().await.len(),
    })
}

pub async fn add_endpoint(
    State(state): State<AdminState>,
    Json(request): Json<AddConfigRequest>,
) -> Result<(StatusCode, Json<Endpoint>), ApiError> {
    const OP: &str = "admin.add_endpoint";
    let descriptor_set = match (&request.descriptor_set, &request.descriptor_key) {
        (Some(encoded), None) => STANDARD
            .decode(encoded)
            .map_err(|e| Error::validation(OP, format!("descriptor_set is not base64: {e}")))?,
        (None, Some(key)) => {
            let blobs = state
                .blobs
                .as_ref()
                .ok_or_else(|| Error::validation(OP, "no blob store configured"))?;
            blobs.download(key).await.map_err(|e| e.within(OP))?
        }
        _ => {
            return Err(Error::validation(
                OP,
                "exactly one of descriptor_set or descriptor_key is required",
            )
            .into())
        }
    };

    let endpoint = state
        .store
        .add_config(NewEndpoint {
            name: request.name,
            service_name: request.service_name,
            description: request.description,
            tags: request.tags,
            balance: request.balance,
            endpoints: request.endpoints,
            descriptor_set,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

pub async fn get_endpoint(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.get(&id).await?))
}

pub async fn list_endpoints(
    State(state): State<AdminState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Endpoint>>, ApiError> {
    let tags: Vec<String> = query
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    let endpoints = if tags.is_empty() {
        state.store.list_all().await?
    } else {
        state.store.list_by_tags(&tags).await?
    };
    Ok(Json(endpoints))
}

pub async fn patch_endpoint(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<PatchRequest>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.patch(&id, &request.fields, &request.mask).await?))
}

pub async fn put_tags(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<PutTagsRequest>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.put_tags(&id, request.tags).await?))
}

pub async fn delete_endpoint(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.del(&id).await?))
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteView>> {
    let routes = state
        .routes
        .routes()
        .into_iter()
        .map(|route| RouteView {
            grpc_method: route.grpc_method(),
            verb: route.http_verb.as_str().to_string(),
            path: route.http_path,
            service: route.service_full_name,
            method: route.method_name,
            auth_required: route.auth_required,
            use_json_response: route.use_json_response,
        })
        .collect();
    Json(routes)
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    Json(
        state
            .registry
            .all_backends()
            .into_iter()
            .map(|(service, backend)| BackendStatus {
                service,
                address: backend.addr.clone(),
                weight: backend.weight(),
                in_flight: backend.in_flight(),
            })
            .collect(),
    )
}

pub async fn resync(State(state): State<AdminState>) -> Result<Json<ResyncResult>, ApiError> {
    let revision = state.reconciler.resync().await?;
    Ok(Json(ResyncResult { revision }))
}
