//! # NEXUS Consent Gateway エントリポイント
//!
//! ## 起動シーケンス
//! 1. 環境変数から設定を読み込む
//! 2. 監査ログを開く（既存ログがあればハッシュチェーンを再開）
//! 3. ストレージバックエンドを初期化し、バケットを確認・作成する
//! 4. HTTPサーバーを起動する

use std::sync::Arc;

use nexus_core::{ConsentRegistry, FileAuditSink};
use nexus_gateway::config::{GatewayConfig, GatewayState, StorageBackend};
use nexus_gateway::storage::ObjectStorage;
use tracing_subscriber::EnvFilter;

/// 設定に応じたストレージ実装を構築する。
fn build_storage(backend: StorageBackend) -> anyhow::Result<Box<dyn ObjectStorage>> {
    match backend {
        #[cfg(feature = "vendor-aws")]
        StorageBackend::S3 => Ok(Box::new(nexus_gateway::storage::S3ObjectStorage::from_env()?)),
        #[cfg(feature = "vendor-local")]
        StorageBackend::Local => Ok(Box::new(
            nexus_gateway::storage::LocalObjectStorage::from_env(),
        )),
        #[allow(unreachable_patterns)]
        other => anyhow::bail!(
            "STORAGE_BACKEND={other:?} はこのビルドで無効です（feature vendor-aws / vendor-local）"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        upload_policy = ?config.upload_policy,
        api_keys = config.api_keys.len(),
        max_upload_size = config.max_upload_size,
        "設定を読み込みました"
    );
    if config.upload_policy == nexus_core::UploadPolicy::ConsentOnly {
        tracing::warn!("UPLOAD_POLICY=consent-only: アップロード時のロール確認を行いません");
    }

    let audit = Arc::new(FileAuditSink::open(&config.audit_log_path)?);
    let storage = build_storage(config.storage_backend)?;

    let state = Arc::new(GatewayState {
        registry: ConsentRegistry::new(),
        audit,
        storage,
        api_keys: config.api_keys.clone(),
        upload_policy: config.upload_policy,
        max_upload_size: config.max_upload_size,
    });

    // ストレージに到達できなくても同意APIは提供する。アップロードは個別にエラーを返す。
    if let Err(e) = nexus_gateway::ensure_bucket(&state).await {
        tracing::warn!(error = %e, "バケットの確認に失敗しました");
    }

    let app = nexus_gateway::build_router(state);

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
