//! # NEXUS Consent Gateway
//!
//! オブジェクトストレージの前段に置く同意ゲートウェイ。
//!
//! ## 役割
//! - 患者ごとの同意状態の記録（付与・撤回・参照）
//! - 同意状態に基づくデータアクセス・アップロードの判定
//! - APIキーによるアップロード時のロール確認
//! - 全判定・結果の監査ログへの記録
//!
//! ## API エンドポイント
//! - `POST /consent/grant?patient_id=` — 同意付与
//! - `POST /consent/revoke?patient_id=` — 同意撤回
//! - `GET /consent/{patient_id}` — 同意状態の参照
//! - `GET /data/access/{patient_id}` — 読み取りアクセス判定
//! - `POST /data/upload/{patient_id}` — アップロード（`X-API-Key` 必須）
//! - `GET /health` — 死活確認

pub mod audit;
pub mod auth;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod storage;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use nexus_core::AuditEvent;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// ルーターを構築する。
pub fn build_router(state: Arc<GatewayState>) -> axum::Router {
    let body_limit = usize::try_from(state.max_upload_size).unwrap_or(usize::MAX);

    axum::Router::new()
        .route("/consent/grant", post(endpoints::handle_grant))
        .route("/consent/revoke", post(endpoints::handle_revoke))
        .route("/consent/{patient_id}", get(endpoints::handle_status))
        .route("/data/access/{patient_id}", get(endpoints::handle_access))
        .route("/data/upload/{patient_id}", post(endpoints::handle_upload))
        .route("/health", get(endpoints::handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// 起動時にバケットの存在を確認し、なければ作成して BUCKET_CREATED を記録する。
/// 作成した場合は `true` を返す。
pub async fn ensure_bucket(state: &GatewayState) -> Result<bool, GatewayError> {
    let bucket = state.storage.bucket_name().to_string();
    if state.storage.bucket_exists().await? {
        tracing::info!(bucket = %bucket, "バケットは作成済みです");
        return Ok(false);
    }

    state.storage.create_bucket().await?;
    audit::record(state, AuditEvent::bucket_created(&bucket, state.registry.now())).await?;
    tracing::info!(bucket = %bucket, "バケットを作成しました");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::test_helpers::{test_gateway, MockObjectStorage};
    use nexus_core::{AuditEventKind, UploadPolicy};

    /// バケットがなければ一度だけ作成・記録されることを確認
    #[tokio::test]
    async fn test_ensure_bucket_creates_once() {
        let gw = test_gateway(MockObjectStorage::default(), UploadPolicy::RequireAdmin);

        assert!(ensure_bucket(&gw.state).await.unwrap());
        assert!(!ensure_bucket(&gw.state).await.unwrap());

        let entries = gw.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.kind, AuditEventKind::BucketCreated);
        assert_eq!(entries[0].event.detail, "name=medical-data");
        assert!(entries[0].event.patient_id.is_none());
    }

    /// ストレージに到達できない場合はエラーを返し、何も記録しないことを確認
    #[tokio::test]
    async fn test_ensure_bucket_storage_unreachable() {
        let gw = test_gateway(MockObjectStorage::failing(), UploadPolicy::RequireAdmin);
        assert!(matches!(
            ensure_bucket(&gw.state).await,
            Err(GatewayError::Storage(_))
        ));
        assert!(gw.audit.is_empty());
    }
}
