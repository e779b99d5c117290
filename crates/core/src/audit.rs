//! # 監査イベントとハッシュチェーン
//!
//! 同意の遷移・アクセス判定・ストレージ結果を表す `AuditEvent` と、
//! それを改ざん検知可能な形で連結する `AuditChain` を定義する。
//!
//! ## チェーン形式
//! 各 `AuditEntry` は連番 `seq`、直前エントリのハッシュ `prev_hash`、
//! および `SHA-256(JSON{seq, event, prev_hash})` の16進表現 `hash` を持つ。
//! 先頭エントリの `prev_hash` は `GENESIS_HASH`。

use std::fmt;

use chrono::{DateTime, Utc};
use nexus_types::ConsentRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::patient::PatientId;
use crate::AuditError;

/// チェーン先頭の `prev_hash`
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// イベント
// ---------------------------------------------------------------------------

/// 監査イベントの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    /// 同意付与
    ConsentGranted,
    /// 同意撤回
    ConsentRevoked,
    /// 同意状態の参照
    ConsentCheck,
    /// アクセス（読み取り・書き込み）許可
    AccessGranted,
    /// 読み取り拒否
    AccessDenied,
    /// アップロード拒否
    UploadDenied,
    /// アップロード成功
    UploadOk,
    /// アップロード時のストレージ失敗
    UploadError,
    /// 起動時のバケット作成
    BucketCreated,
}

impl AuditEventKind {
    /// ログ上の表記
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::ConsentGranted => "CONSENT_GRANTED",
            AuditEventKind::ConsentRevoked => "CONSENT_REVOKED",
            AuditEventKind::ConsentCheck => "CONSENT_CHECK",
            AuditEventKind::AccessGranted => "ACCESS_GRANTED",
            AuditEventKind::AccessDenied => "ACCESS_DENIED",
            AuditEventKind::UploadDenied => "UPLOAD_DENIED",
            AuditEventKind::UploadOk => "UPLOAD_OK",
            AuditEventKind::UploadError => "UPLOAD_ERROR",
            AuditEventKind::BucketCreated => "BUCKET_CREATED",
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1件の監査イベント。追記後に変更・削除されることはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// イベント種類
    pub kind: AuditEventKind,
    /// 対象の患者ID（BUCKET_CREATED のみ None）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// 発生時刻（UTC）
    pub timestamp: DateTime<Utc>,
    /// 拒否理由・オブジェクトキー・エラー内容などの付加情報
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl AuditEvent {
    fn for_patient(
        kind: AuditEventKind,
        patient_id: &PatientId,
        timestamp: DateTime<Utc>,
        detail: String,
    ) -> Self {
        Self {
            kind,
            patient_id: Some(patient_id.to_string()),
            timestamp,
            detail,
        }
    }

    /// grant/revoke の結果から CONSENT_GRANTED / CONSENT_REVOKED を構築する。
    pub fn consent_changed(record: &ConsentRecord) -> Self {
        let kind = if record.granted {
            AuditEventKind::ConsentGranted
        } else {
            AuditEventKind::ConsentRevoked
        };
        Self {
            kind,
            patient_id: Some(record.patient_id.clone()),
            timestamp: record.updated_at,
            detail: String::new(),
        }
    }

    /// CONSENT_CHECK
    pub fn consent_check(patient_id: &PatientId, granted: bool, at: DateTime<Utc>) -> Self {
        Self::for_patient(
            AuditEventKind::ConsentCheck,
            patient_id,
            at,
            format!("granted={granted}"),
        )
    }

    /// UPLOAD_OK
    pub fn upload_ok(patient_id: &PatientId, object_key: &str, at: DateTime<Utc>) -> Self {
        Self::for_patient(
            AuditEventKind::UploadOk,
            patient_id,
            at,
            format!("object={object_key}"),
        )
    }

    /// UPLOAD_ERROR
    pub fn upload_error(patient_id: &PatientId, error: &str, at: DateTime<Utc>) -> Self {
        Self::for_patient(
            AuditEventKind::UploadError,
            patient_id,
            at,
            format!("error={error}"),
        )
    }

    /// BUCKET_CREATED
    pub fn bucket_created(bucket: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: AuditEventKind::BucketCreated,
            patient_id: None,
            timestamp: at,
            detail: format!("name={bucket}"),
        }
    }

    pub(crate) fn decision(
        kind: AuditEventKind,
        patient_id: &PatientId,
        at: DateTime<Utc>,
        detail: String,
    ) -> Self {
        Self::for_patient(kind, patient_id, at, detail)
    }
}

impl fmt::Display for AuditEvent {
    /// `KIND patient_id=<id> <detail>` 形式
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(patient_id) = &self.patient_id {
            write!(f, " patient_id={patient_id}")?;
        }
        if !self.detail.is_empty() {
            write!(f, " {}", self.detail)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ハッシュチェーン
// ---------------------------------------------------------------------------

/// チェーンに連結済みの監査エントリ。監査ログの1行に対応する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 0始まりの連番
    pub seq: u64,
    /// イベント本体
    #[serde(flatten)]
    pub event: AuditEvent,
    /// 直前エントリの `hash`
    pub prev_hash: String,
    /// このエントリのハッシュ
    pub hash: String,
}

/// ハッシュ計算の対象
#[derive(Serialize)]
struct HashTarget<'a> {
    seq: u64,
    event: &'a AuditEvent,
    prev_hash: &'a str,
}

/// エントリのハッシュを計算する。
pub fn entry_hash(seq: u64, event: &AuditEvent, prev_hash: &str) -> Result<String, AuditError> {
    let bytes = serde_json::to_vec(&HashTarget {
        seq,
        event,
        prev_hash,
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// 追記位置（次の連番と直前ハッシュ）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditChain {
    next_seq: u64,
    last_hash: String,
}

impl AuditChain {
    /// 空のログから始めるチェーン
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }

    /// 既存ログの最終エントリから再開する。
    pub fn resume(last: &AuditEntry) -> Self {
        Self {
            next_seq: last.seq + 1,
            last_hash: last.hash.clone(),
        }
    }

    /// 次に割り当てる連番
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// 直前エントリのハッシュ
    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    /// イベントをチェーンに連結し、追記位置を進める。
    pub fn seal(&mut self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        let hash = entry_hash(self.next_seq, &event, &self.last_hash)?;
        let entry = AuditEntry {
            seq: self.next_seq,
            event,
            prev_hash: std::mem::replace(&mut self.last_hash, hash.clone()),
            hash,
        };
        self.next_seq += 1;
        Ok(entry)
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

/// チェーン検証の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// 検証したエントリ数
    pub total_entries: u64,
    /// 全エントリが正しく連結されているか
    pub intact: bool,
    /// 最初に不整合が見つかったエントリの連番
    pub first_break_at: Option<u64>,
}

/// ログ先頭からのエントリ列を検証する。
///
/// 連番の欠落・`prev_hash` の不一致・`hash` の再計算不一致のいずれかを不整合とみなす。
pub fn verify_chain(entries: &[AuditEntry]) -> Result<ChainVerification, AuditError> {
    let mut expected_seq = 0u64;
    let mut prev_hash = GENESIS_HASH.to_string();
    let mut first_break_at = None;

    for entry in entries {
        let recomputed = entry_hash(entry.seq, &entry.event, &entry.prev_hash)?;
        let linked = entry.seq == expected_seq && entry.prev_hash == prev_hash;
        if (!linked || recomputed != entry.hash) && first_break_at.is_none() {
            first_break_at = Some(entry.seq);
        }
        prev_hash = entry.hash.clone();
        expected_seq = entry.seq + 1;
    }

    Ok(ChainVerification {
        total_entries: entries.len() as u64,
        intact: first_break_at.is_none(),
        first_break_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn pid(raw: &str) -> PatientId {
        PatientId::parse(raw).unwrap()
    }

    fn sealed(n: usize) -> Vec<AuditEntry> {
        let mut chain = AuditChain::new();
        (0..n)
            .map(|i| {
                chain
                    .seal(AuditEvent::consent_check(&pid(&format!("p{i}")), false, at()))
                    .unwrap()
            })
            .collect()
    }

    /// 元のログ形式 `KIND patient_id=...` で表示されることを確認
    #[test]
    fn test_event_display() {
        let event = AuditEvent::upload_ok(&pid("p1"), "p1/scan.enc", at());
        assert_eq!(event.to_string(), "UPLOAD_OK patient_id=p1 object=p1/scan.enc");

        let event = AuditEvent::bucket_created("medical-data", at());
        assert_eq!(event.to_string(), "BUCKET_CREATED name=medical-data");
    }

    /// grant/revoke結果から正しい種類のイベントが構築されることを確認
    #[test]
    fn test_consent_changed_kind() {
        let record = ConsentRecord {
            patient_id: "p1".to_string(),
            granted: true,
            updated_at: at(),
        };
        let event = AuditEvent::consent_changed(&record);
        assert_eq!(event.kind, AuditEventKind::ConsentGranted);
        assert_eq!(event.timestamp, at());

        let event = AuditEvent::consent_changed(&ConsentRecord {
            granted: false,
            ..record
        });
        assert_eq!(event.kind, AuditEventKind::ConsentRevoked);
    }

    /// 種類がログ上の表記でシリアライズされることを確認
    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&AuditEventKind::UploadDenied).unwrap();
        assert_eq!(json, "\"UPLOAD_DENIED\"");
        assert_eq!(AuditEventKind::UploadDenied.to_string(), "UPLOAD_DENIED");
    }

    /// 連番とprev_hashが正しく連結されることを確認
    #[test]
    fn test_seal_links_entries() {
        let entries = sealed(3);
        assert_eq!(entries[0].prev_hash, GENESIS_HASH);
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert_eq!(entries[2].prev_hash, entries[1].hash);
        assert_eq!(
            entries.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let verification = verify_chain(&entries).unwrap();
        assert!(verification.intact);
        assert_eq!(verification.total_entries, 3);
    }

    /// 改ざんされたエントリが検出されることを確認
    #[test]
    fn test_verify_detects_tampering() {
        let mut entries = sealed(4);
        entries[2].event.detail = "granted=true".to_string();

        let verification = verify_chain(&entries).unwrap();
        assert!(!verification.intact);
        assert_eq!(verification.first_break_at, Some(2));
    }

    /// エントリの削除が検出されることを確認
    #[test]
    fn test_verify_detects_removal() {
        let mut entries = sealed(4);
        entries.remove(1);

        let verification = verify_chain(&entries).unwrap();
        assert!(!verification.intact);
        assert_eq!(verification.first_break_at, Some(2));
    }

    /// 再開したチェーンが続きの連番から連結されることを確認
    #[test]
    fn test_resume_continues_chain() {
        let mut entries = sealed(2);
        let mut chain = AuditChain::resume(entries.last().unwrap());
        assert_eq!(chain.next_seq(), 2);

        entries.push(
            chain
                .seal(AuditEvent::bucket_created("medical-data", at()))
                .unwrap(),
        );
        assert!(verify_chain(&entries).unwrap().intact);
    }

    /// JSON行からの復元後もハッシュが再計算で一致することを確認
    #[test]
    fn test_entry_hash_stable_after_json() {
        let entry = sealed(1).remove(0);
        let line = serde_json::to_string(&entry).unwrap();
        let restored: AuditEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(restored, entry);
        assert_eq!(
            entry_hash(restored.seq, &restored.event, &restored.prev_hash).unwrap(),
            entry.hash
        );
    }
}
