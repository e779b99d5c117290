//! # GET /health
//!
//! 死活監視用。レジストリ・ストレージには触れない。

use axum::Json;

/// GET /health — 死活確認。
pub async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
