//! # /consent
//!
//! 同意の付与・撤回・参照。
//! - `POST /consent/grant?patient_id=`
//! - `POST /consent/revoke?patient_id=`
//! - `GET /consent/{patient_id}`

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use nexus_core::PatientId;
use nexus_types::*;

use crate::audit::{record, record_transition};
use crate::config::GatewayState;
use crate::error::GatewayError;

/// POST /consent/grant — 同意付与。
pub async fn handle_grant(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<ConsentChangeResponse>, GatewayError> {
    let patient_id = PatientId::parse(&query.patient_id)?;
    let consent = record_transition(&state, patient_id, true).await?;
    Ok(Json(ConsentChangeResponse::from(&consent)))
}

/// POST /consent/revoke — 同意撤回。
pub async fn handle_revoke(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<ConsentChangeResponse>, GatewayError> {
    let patient_id = PatientId::parse(&query.patient_id)?;
    let consent = record_transition(&state, patient_id, false).await?;
    Ok(Json(ConsentChangeResponse::from(&consent)))
}

/// GET /consent/{patient_id} — 同意状態の参照。
/// レコードのない患者は `granted: false` を返す。
pub async fn handle_status(
    State(state): State<Arc<GatewayState>>,
    Path(patient_id): Path<String>,
) -> Result<Json<ConsentStatusResponse>, GatewayError> {
    let patient_id = PatientId::parse(&patient_id)?;
    let (consent, event) = nexus_core::check(&state.registry, &patient_id);
    record(&state, event).await?;
    Ok(Json(ConsentStatusResponse::from_record(
        patient_id.as_str(),
        consent.as_ref(),
    )))
}
