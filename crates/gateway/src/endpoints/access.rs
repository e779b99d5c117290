//! # GET /data/access/{patient_id}
//!
//! 同意のみを条件とする読み取りアクセス判定。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use nexus_core::{decide, Operation, PatientId, Verdict};
use nexus_types::*;

use crate::audit::record;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /data/access/{patient_id} — 読み取りアクセス判定。
///
/// 拒否は通常のレスポンス（200）として返す。
pub async fn handle_access(
    State(state): State<Arc<GatewayState>>,
    Path(patient_id): Path<String>,
) -> Result<Json<AccessResponse>, GatewayError> {
    let patient_id = PatientId::parse(&patient_id)?;
    let decision = decide(
        &state.registry,
        &patient_id,
        Operation::Read,
        None,
        state.upload_policy,
    );
    record(&state, decision.event).await?;

    Ok(Json(match decision.verdict {
        Verdict::Allow => AccessResponse::Granted,
        Verdict::Deny(reason) => AccessResponse::Denied {
            reason: reason.to_string(),
        },
    }))
}
