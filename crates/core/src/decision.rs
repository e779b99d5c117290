//! # Access Decision Engine
//!
//! 同意状態・操作種別・ロールからアクセス可否を導出する。
//!
//! レジストリは参照のみで更新しない。監査ログへの書き込みも行わず、
//! 判定結果と監査イベントを呼び出し側に返す。追記は呼び出し側の責務。
//!
//! ## 判定順序
//! 1. `Write` かつ `UploadPolicy::RequireAdmin` で、ロールが `Admin` でない
//!    → Deny（insufficient privileges）
//! 2. 同意レコードがない、または `granted = false` → Deny（no valid consent）
//! 3. それ以外 → Allow

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nexus_types::{ConsentRecord, Role};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::patient::PatientId;
use crate::registry::ConsentRegistry;

/// 要求された操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// 同意状態の確認・データアクセス
    Read,
    /// アップロード
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
        })
    }
}

/// アップロード時のロール要件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPolicy {
    /// アップロードには `admin` ロールが必要
    #[default]
    RequireAdmin,
    /// 同意のみで判定し、ロールは見ない
    ConsentOnly,
}

/// 未知のポリシー名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知のアップロードポリシーです: {0}（require-admin / consent-only）")]
pub struct UnknownPolicy(pub String);

impl FromStr for UploadPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "require-admin" => Ok(UploadPolicy::RequireAdmin),
            "consent-only" => Ok(UploadPolicy::ConsentOnly),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// 拒否理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// ロール不足
    InsufficientPrivileges,
    /// 有効な同意がない
    NoValidConsent,
}

impl DenyReason {
    /// 外部に返す理由文字列
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InsufficientPrivileges => "insufficient privileges",
            DenyReason::NoValidConsent => "no valid consent",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 許可
    Allow,
    /// 拒否
    Deny(DenyReason),
}

impl Verdict {
    /// 許可されたか
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// `decide` の戻り値。判定結果と、それを記録する監査イベント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// 判定結果
    pub verdict: Verdict,
    /// 呼び出し側が追記すべき監査イベント
    pub event: AuditEvent,
}

/// 判定ルール本体。レジストリから引いたレコードに対する純粋関数。
pub fn evaluate(
    record: Option<&ConsentRecord>,
    operation: Operation,
    role: Option<Role>,
    policy: UploadPolicy,
) -> Verdict {
    if operation == Operation::Write
        && policy == UploadPolicy::RequireAdmin
        && role != Some(Role::Admin)
    {
        return Verdict::Deny(DenyReason::InsufficientPrivileges);
    }

    match record {
        Some(record) if record.granted => Verdict::Allow,
        _ => Verdict::Deny(DenyReason::NoValidConsent),
    }
}

/// アクセス可否を判定し、監査イベントを組み立てる。
pub fn decide(
    registry: &ConsentRegistry,
    patient_id: &PatientId,
    operation: Operation,
    role: Option<Role>,
    policy: UploadPolicy,
) -> Decision {
    let record = registry.get(patient_id);
    let verdict = evaluate(record.as_ref(), operation, role, policy);
    let event = decision_event(patient_id, operation, verdict, registry.now());

    tracing::debug!(
        patient_id = %patient_id,
        operation = %operation,
        role = ?role,
        verdict = ?verdict,
        "アクセス判定"
    );

    Decision { verdict, event }
}

/// 同意状態を参照し、CONSENT_CHECK イベントを組み立てる。
pub fn check(
    registry: &ConsentRegistry,
    patient_id: &PatientId,
) -> (Option<ConsentRecord>, AuditEvent) {
    let record = registry.get(patient_id);
    let granted = record.as_ref().is_some_and(|r| r.granted);
    let event = AuditEvent::consent_check(patient_id, granted, registry.now());
    (record, event)
}

/// 判定結果に対応する監査イベント。
///
/// 書き込みの許可は ACCESS_GRANTED（`operation=write`）として記録し、
/// ストレージの結果は呼び出し側が UPLOAD_OK / UPLOAD_ERROR として別途記録する。
fn decision_event(
    patient_id: &PatientId,
    operation: Operation,
    verdict: Verdict,
    at: DateTime<Utc>,
) -> AuditEvent {
    let (kind, detail) = match (operation, verdict) {
        (_, Verdict::Allow) => (AuditEventKind::AccessGranted, format!("operation={operation}")),
        (Operation::Read, Verdict::Deny(reason)) => {
            (AuditEventKind::AccessDenied, reason.as_str().to_string())
        }
        (Operation::Write, Verdict::Deny(reason)) => {
            (AuditEventKind::UploadDenied, reason.as_str().to_string())
        }
    };
    AuditEvent::decision(kind, patient_id, at, detail)
}
