//! # NEXUS 共有型定義
//!
//! Gateway・CLI・Coreで共有するデータ構造と、HTTP APIのリクエスト/レスポンス型を提供する。
//!
//! ## エンコーディング規則
//! - 時刻: RFC 3339（UTC）
//! - ロール・ステータス: 小文字の文字列（`"admin"`, `"granted"` 等）

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ロール
// ---------------------------------------------------------------------------

/// APIキーから解決される呼び出し元のロール。
/// 永続化はされず、リクエストごとに静的テーブルから引かれる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 管理者。アップロードが許可される唯一のロール。
    Admin,
    /// 一般利用者
    User,
}

impl Role {
    /// ロールの文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知のロール文字列
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知のロールです: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// 同意レコード
// ---------------------------------------------------------------------------

/// 患者ごとの現在の同意状態。
///
/// 患者IDごとに高々1件しか存在せず、grant/revokeのたびに丸ごと置き換えられる。
/// レコードが存在しないことは `granted = false` と同じ意味を持つ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// 呼び出し側が与える不透明な患者ID
    pub patient_id: String,
    /// 現在の同意状態
    pub granted: bool,
    /// 最後にgrant/revokeされた時刻（患者ごとに単調非減少）
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// /consent API
// ---------------------------------------------------------------------------

/// `?patient_id=` クエリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientQuery {
    /// 対象の患者ID
    pub patient_id: String,
}

/// grant/revoke後の同意状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    /// 同意済み
    Granted,
    /// 撤回済み
    Revoked,
}

/// POST /consent/grant, POST /consent/revoke のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentChangeResponse {
    /// 遷移後の状態
    pub status: ConsentStatus,
    /// 対象の患者ID
    pub patient_id: String,
    /// 遷移時刻
    pub updated_at: DateTime<Utc>,
}

impl From<&ConsentRecord> for ConsentChangeResponse {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            status: if record.granted {
                ConsentStatus::Granted
            } else {
                ConsentStatus::Revoked
            },
            patient_id: record.patient_id.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// GET /consent/{patient_id} のレスポンス。
/// レコードが存在しない患者は `granted: false` かつ `updated_at` なしで返る。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatusResponse {
    /// 対象の患者ID
    pub patient_id: String,
    /// 現在の同意状態
    pub granted: bool,
    /// 最後の遷移時刻（レコードがある場合のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConsentStatusResponse {
    /// レジストリの参照結果からレスポンスを構築する。
    pub fn from_record(patient_id: &str, record: Option<&ConsentRecord>) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            granted: record.is_some_and(|r| r.granted),
            updated_at: record.map(|r| r.updated_at),
        }
    }
}

// ---------------------------------------------------------------------------
// /data API
// ---------------------------------------------------------------------------

/// GET /data/access/{patient_id} のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", rename_all = "lowercase")]
pub enum AccessResponse {
    /// アクセス許可
    Granted,
    /// アクセス拒否
    Denied {
        /// 拒否理由
        reason: String,
    },
}

/// POST /data/upload/{patient_id} のクエリ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadQuery {
    /// オブジェクトキー `{patient_id}/scan.<ext>` の拡張子。省略時は `enc`。
    #[serde(default)]
    pub ext: Option<String>,
}

/// POST /data/upload/{patient_id} のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResponse {
    /// アップロード成功
    Uploaded {
        /// 保存先オブジェクトキー
        object: String,
        /// ペイロードの暗号化方式（Gatewayは暗号化を行わない）
        encryption: String,
    },
    /// ポリシーにより拒否
    Denied {
        /// 拒否理由
        reason: String,
    },
    /// ストレージ操作の失敗
    Error {
        /// 失敗内容
        detail: String,
    },
}
