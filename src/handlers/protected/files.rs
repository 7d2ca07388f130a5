use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{require_role, resource_or_404};
use crate::database::{SqlValue, TenantRepository};
use crate::error::ApiError;
use crate::handlers::parse_id;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::resources::{ColumnDef, ResourceDef};
use crate::state::AppState;
use crate::tenant::TenantScope;
use crate::uploads::{self, DocumentSlot, StoredFile, UploadError, UploadTarget};

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotInfo {
    pub slot: DocumentSlot,
    pub path: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub slot: DocumentSlot,
    #[serde(flatten)]
    pub file: StoredFile,
    pub record: Value,
}

/// A resolved `/:resource/:id/:slot` target with its owning record
struct SlotTarget {
    resource: &'static ResourceDef,
    slot: DocumentSlot,
    column: &'static ColumnDef,
    id: uuid::Uuid,
    record: Value,
    /// Scope pinned to the record's tenant
    scope: TenantScope,
}

impl SlotTarget {
    fn client_id(&self) -> &str {
        self.scope.client_id().unwrap_or_default()
    }

    fn current_path(&self) -> Option<String> {
        self.record
            .get(self.column.name)
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}

fn parse_slot(resource: &ResourceDef, raw: &str) -> Result<(DocumentSlot, &'static ColumnDef), ApiError> {
    let slot: DocumentSlot = raw.parse()?;
    if !resource.has_slot(slot) {
        return Err(UploadError::SlotNotAllowed {
            resource: resource.name.to_string(),
            slot: slot.to_string(),
        }
        .into());
    }
    let column = resource
        .column(slot.column())
        .ok_or_else(|| ApiError::internal_server_error(format!("{} has no column for {}", resource.name, slot)))?;
    Ok((slot, column))
}

/// Load the record through the caller's scope, then pin every later step to
/// the tenant that owns it. Administrators reaching across tenants store
/// files under the record's client, not their own.
async fn load_record(
    state: &AppState,
    user: &AuthUser,
    resource: &'static ResourceDef,
    id: uuid::Uuid,
    requested: Option<&str>,
) -> Result<(Value, TenantScope), ApiError> {
    let scope = TenantScope::resolve(user, resource.scope, requested)?;
    let record = TenantRepository::new(resource, state.db.pool().clone()).get(&scope, id).await?;
    let client_id = record
        .get("client_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::internal_server_error("Record has no client id"))?
        .to_string();
    Ok((record, TenantScope::tenant(client_id)))
}

async fn resolve_target(
    state: &AppState,
    user: &AuthUser,
    (resource, id, slot): (String, String, String),
    requested: Option<&str>,
) -> Result<SlotTarget, ApiError> {
    let resource = resource_or_404(&resource)?;
    let (slot, column) = parse_slot(resource, &slot)?;
    let id = parse_id(&id)?;
    let (record, scope) = load_record(state, user, resource, id, requested).await?;
    Ok(SlotTarget { resource, slot, column, id, record, scope })
}

/// Pull the `file` field out of a multipart body
async fn read_file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(UploadError::MissingFile.into())
}

/// Store the upload and point the slot column at it. The new file is removed
/// again if the record update fails.
async fn store(state: &AppState, target: &SlotTarget, file_name: &str, bytes: &[u8]) -> Result<(StoredFile, Value), ApiError> {
    let stored = state
        .uploads
        .save(
            &UploadTarget {
                client_id: target.client_id(),
                resource: target.resource.name,
                record_id: target.id,
                slot: target.slot,
            },
            file_name,
            bytes,
        )
        .await?;

    let update = TenantRepository::new(target.resource, state.db.pool().clone())
        .update_columns(&target.scope, target.id, vec![(target.column, SqlValue::text(&stored.path))])
        .await;
    match update {
        Ok(record) => Ok((stored, record)),
        Err(e) => {
            if let Err(cleanup) = state.uploads.remove(&stored.path).await {
                tracing::error!(path = %stored.path, "Failed to remove orphaned upload: {}", cleanup);
            }
            Err(e.into())
        }
    }
}

/// POST /api/files/:resource/:id/:slot - first upload into an empty slot
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<(String, String, String)>,
    Query(query): Query<FilesQuery>,
    multipart: Multipart,
) -> ApiResult<UploadResult> {
    let target = resolve_target(&state, &user, path, query.client_id.as_deref()).await?;
    require_role(&user, target.resource.write_roles, &format!("upload {} documents", target.resource.name))?;
    if target.current_path().is_some() {
        return Err(ApiError::conflict(format!(
            "A {} document already exists; use PUT to replace it",
            target.slot
        )));
    }

    let (file_name, bytes) = read_file_field(multipart).await?;
    let (file, record) = store(&state, &target, &file_name, &bytes).await?;
    Ok(ApiResponse::created(UploadResult { slot: target.slot, file, record }))
}

/// PUT /api/files/:resource/:id/:slot - replace, removing the previous file
pub async fn replace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<(String, String, String)>,
    Query(query): Query<FilesQuery>,
    multipart: Multipart,
) -> ApiResult<UploadResult> {
    let target = resolve_target(&state, &user, path, query.client_id.as_deref()).await?;
    require_role(&user, target.resource.write_roles, &format!("replace {} documents", target.resource.name))?;
    let previous = target.current_path();

    let (file_name, bytes) = read_file_field(multipart).await?;
    let (file, record) = store(&state, &target, &file_name, &bytes).await?;

    if let Some(previous) = previous.filter(|p| *p != file.path) {
        state.uploads.discard(&previous).await;
    }
    tracing::info!(
        client_id = %target.client_id(),
        resource = target.resource.name,
        record_id = %target.id,
        slot = %target.slot,
        "Replaced document"
    );
    Ok(ApiResponse::success(UploadResult { slot: target.slot, file, record }))
}

/// GET /api/files/:resource/:id - every slot the resource accepts
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<Vec<SlotInfo>> {
    let resource = resource_or_404(&resource)?;
    let id = parse_id(&id)?;
    let (record, _) = load_record(&state, &user, resource, id, query.client_id.as_deref()).await?;

    let slots = resource
        .slots
        .iter()
        .map(|&slot| {
            let path = record
                .get(slot.column())
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            SlotInfo {
                slot,
                file_name: path.as_deref().map(|p| uploads::original_name(slot, p)),
                path,
            }
        })
        .collect();
    Ok(ApiResponse::success(slots))
}

/// GET /api/files/:resource/:id/:slot - stream the stored file
pub async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<(String, String, String)>,
    Query(query): Query<FilesQuery>,
) -> Result<Response, ApiError> {
    let target = resolve_target(&state, &user, path, query.client_id.as_deref()).await?;
    let stored = target
        .current_path()
        .ok_or_else(|| UploadError::NoFile(target.slot.to_string()))?;

    let bytes = state.uploads.read(&stored).await?;
    let name = uploads::original_name(target.slot, &stored);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, uploads::content_type(&name).to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/files/:resource/:id/:slot
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<(String, String, String)>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<Value> {
    let target = resolve_target(&state, &user, path, query.client_id.as_deref()).await?;
    require_role(&user, target.resource.write_roles, &format!("remove {} documents", target.resource.name))?;
    let stored = target
        .current_path()
        .ok_or_else(|| UploadError::NoFile(target.slot.to_string()))?;

    let record = TenantRepository::new(target.resource, state.db.pool().clone())
        .update_columns(&target.scope, target.id, vec![(target.column, SqlValue::Text(None))])
        .await?;
    let removed = state.uploads.discard(&stored).await;

    tracing::info!(
        client_id = %target.client_id(),
        resource = target.resource.name,
        record_id = %target.id,
        slot = %target.slot,
        "Removed document"
    );
    Ok(ApiResponse::success(json!({ "slot": target.slot, "file_removed": removed, "record": record })))
}
