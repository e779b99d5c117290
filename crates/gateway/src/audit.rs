//! # 監査ログへの記録
//!
//! ハンドラが判定・結果のイベントを追記するためのヘルパー。
//! ファイルへの追記は fsync を伴うため、ブロッキングスレッドで実行する。

use std::sync::Arc;

use nexus_core::{AuditEntry, AuditEvent, PatientId};
use nexus_types::ConsentRecord;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// イベントを監査ログに追記する。
///
/// 1リクエスト内の追記は順に await されるため、同一リクエストのイベント順は保たれる。
/// リクエスト間の順序は `AuditSink` 内部のロックで直列化される。
pub async fn record(state: &GatewayState, event: AuditEvent) -> Result<AuditEntry, GatewayError> {
    let sink = state.audit.clone();
    let entry = tokio::task::spawn_blocking(move || sink.append(event))
        .await
        .map_err(|e| GatewayError::Internal(format!("監査ログ書き込みタスクが異常終了: {e}")))??;
    Ok(entry)
}

/// 同意を付与または撤回し、その遷移を監査ログに追記する。
///
/// 遷移と追記はレジストリのロックの下で1つの操作として行われる。
/// 追記に失敗した場合は同意状態を変更せずにエラーを返す。
pub async fn record_transition(
    state: &Arc<GatewayState>,
    patient_id: PatientId,
    granted: bool,
) -> Result<ConsentRecord, GatewayError> {
    let state = state.clone();
    let (consent, _) = tokio::task::spawn_blocking(move || {
        let sink = state.audit.as_ref();
        if granted {
            state.registry.grant_audited(&patient_id, sink)
        } else {
            state.registry.revoke_audited(&patient_id, sink)
        }
    })
    .await
    .map_err(|e| GatewayError::Internal(format!("監査ログ書き込みタスクが異常終了: {e}")))??;
    Ok(consent)
}
