//! Notification code catalog endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::notification::{NotificationCode, SourceIdentity};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct CodeListResponse {
    pub source: SourceIdentity,
    /// Whether the source registered its own protocol
    pub registered: bool,
    pub codes: Vec<NotificationCode>,
}

/// GET /api/v1/sources/{component_type}/{component_name}/codes
pub async fn list_codes(
    State(state): State<AppState>,
    Path((component_type, component_name)): Path<(String, String)>,
) -> Json<CodeListResponse> {
    let source = SourceIdentity::new(component_type, component_name);
    let protocol = state.registry.for_source(&source);

    Json(CodeListResponse {
        registered: state.registry.is_registered(&source),
        codes: protocol.codes(),
        source,
    })
}
