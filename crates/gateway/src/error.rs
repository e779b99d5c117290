//! # Gateway エラー型

use axum::http::StatusCode;
use nexus_core::{AuditError, ConsentError};

/// Gatewayエラー型。
///
/// ポリシーによる拒否はエラーではなく通常のレスポンスとして返すため、ここには含まない。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// APIキーが未指定または無効
    #[error("認証に失敗: {0}")]
    Unauthorized(String),
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// 監査ログへの追記に失敗
    #[error("監査ログへの記録に失敗: {0}")]
    Audit(#[from] AuditError),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<ConsentError> for GatewayError {
    fn from(e: ConsentError) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Storage(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Audit(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        }
        (status, self.to_string()).into_response()
    }
}
