//! # POST /data/upload/{patient_id}
//!
//! 同意とロールで保護されたアップロード。
//!
//! ## 処理順序
//! 1. APIキーをロールに解決（未解決なら判定前に 401）
//! 2. 患者IDの検証
//! 3. アクセス判定を行い、判定イベントを記録（ロール不足・同意なしはここで拒否）
//! 4. 拡張子・ペイロードの検証（許可された後も不正なら 400）
//! 5. ストレージに書き込み、UPLOAD_OK / UPLOAD_ERROR を記録
//!
//! ペイロードはクライアント側で暗号化済みのものとして扱い、Gatewayでは暗号化しない。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use nexus_core::{decide, AuditEvent, DenyReason, Operation, PatientId, Verdict};
use nexus_types::*;

use crate::audit::record;
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::storage::{object_key, validate_extension, OCTET_STREAM};

/// レスポンスで示す暗号化方式
const CLIENT_SIDE_ENCRYPTION: &str = "client-side";

/// POST /data/upload/{patient_id} — アップロード。
///
/// - ロール不足による拒否は 403、同意なしによる拒否は 200 で `status: denied` を返す
/// - ストレージ失敗は 502 で `status: error` を返す（同意状態には影響しない）
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    Path(patient_id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), GatewayError> {
    let role = state.api_keys.authorize(&headers, state.upload_policy)?;

    let patient_id = PatientId::parse(&patient_id)?;

    let decision = decide(
        &state.registry,
        &patient_id,
        Operation::Write,
        role,
        state.upload_policy,
    );
    record(&state, decision.event).await?;

    if let Verdict::Deny(reason) = decision.verdict {
        let status = match reason {
            DenyReason::InsufficientPrivileges => StatusCode::FORBIDDEN,
            DenyReason::NoValidConsent => StatusCode::OK,
        };
        return Ok((
            status,
            Json(UploadResponse::Denied {
                reason: reason.to_string(),
            }),
        ));
    }

    let ext = validate_extension(query.ext.as_deref())?;
    if body.is_empty() {
        return Err(GatewayError::BadRequest(
            "ペイロードが空です".to_string(),
        ));
    }
    if body.len() as u64 > state.max_upload_size {
        return Err(GatewayError::BadRequest(format!(
            "ペイロードサイズが上限を超えています: {} bytes (上限: {} bytes)",
            body.len(),
            state.max_upload_size
        )));
    }

    let key = object_key(&patient_id, ext);
    match state.storage.put_object(&key, &body, OCTET_STREAM).await {
        Ok(()) => {
            record(&state, AuditEvent::upload_ok(&patient_id, &key, state.registry.now())).await?;
            tracing::info!(
                patient_id = %patient_id,
                object = %key,
                bytes = body.len(),
                "アップロード完了"
            );
            Ok((
                StatusCode::OK,
                Json(UploadResponse::Uploaded {
                    object: key,
                    encryption: CLIENT_SIDE_ENCRYPTION.to_string(),
                }),
            ))
        }
        Err(e) => {
            let detail = e.to_string();
            tracing::warn!(
                patient_id = %patient_id,
                object = %key,
                error = %detail,
                "アップロード失敗"
            );
            record(
                &state,
                AuditEvent::upload_error(&patient_id, &detail, state.registry.now()),
            )
            .await?;
            Ok((StatusCode::BAD_GATEWAY, Json(UploadResponse::Error { detail })))
        }
    }
}
