//! Recipient channel preference endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::notification::{Channel, ChannelPolicy, SourceIdentity};
use crate::server::AppState;
use crate::store::ChannelPreference;

#[derive(Debug, Deserialize)]
pub struct PreferencePath {
    pub member_id: i64,
    pub component_type: String,
    pub component_name: String,
    pub code: String,
}

impl PreferencePath {
    fn source(&self) -> SourceIdentity {
        SourceIdentity::new(&self.component_type, &self.component_name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferenceResponse {
    pub member_id: i64,
    pub source: SourceIdentity,
    pub kind: String,
    /// Explicit row, `None` when the source default applies
    pub preference: Option<ChannelPreference>,
    /// Channels a send would resolve to
    pub channels: Vec<Channel>,
}

async fn describe(state: &AppState, path: &PreferencePath) -> Result<PreferenceResponse> {
    let source = path.source();
    let preference = state
        .preferences
        .get(path.member_id, &source, &path.code)
        .await?;

    let policy = ChannelPolicy::new(state.preferences.clone(), state.registry.clone());
    let channels = policy.resolve(path.member_id, &source, &path.code).await?;

    Ok(PreferenceResponse {
        member_id: path.member_id,
        source,
        kind: path.code.clone(),
        preference,
        channels,
    })
}

fn ensure_member(member_id: i64) -> Result<()> {
    if member_id <= 0 {
        return Err(AppError::Validation(
            "Preferences require a member id greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/v1/members/{member_id}/preferences/{component_type}/{component_name}/{code}
pub async fn get_preference(
    State(state): State<AppState>,
    Path(path): Path<PreferencePath>,
) -> Result<Json<PreferenceResponse>> {
    Ok(Json(describe(&state, &path).await?))
}

/// PUT /api/v1/members/{member_id}/preferences/{component_type}/{component_name}/{code}
pub async fn put_preference(
    State(state): State<AppState>,
    Path(path): Path<PreferencePath>,
    Json(preference): Json<ChannelPreference>,
) -> Result<Json<PreferenceResponse>> {
    ensure_member(path.member_id)?;

    state
        .preferences
        .put(path.member_id, &path.source(), &path.code, preference)
        .await?;

    tracing::info!(
        member_id = path.member_id,
        source = %path.source(),
        kind = %path.code,
        web = preference.web,
        sms = preference.sms,
        email = preference.email,
        "Updated channel preference"
    );

    Ok(Json(describe(&state, &path).await?))
}

/// DELETE /api/v1/members/{member_id}/preferences/{component_type}/{component_name}/{code}
pub async fn delete_preference(
    State(state): State<AppState>,
    Path(path): Path<PreferencePath>,
) -> Result<Json<PreferenceResponse>> {
    ensure_member(path.member_id)?;

    if !state
        .preferences
        .delete(path.member_id, &path.source(), &path.code)
        .await?
    {
        return Err(AppError::NotFound(format!(
            "No preference for '{}' on {}",
            path.code,
            path.source()
        )));
    }

    Ok(Json(describe(&state, &path).await?))
}
