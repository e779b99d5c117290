//! # Consent Registry
//!
//! 患者IDから現在の同意状態への、プロセス内で唯一の権威あるマッピング。
//!
//! マッピング全体を単一の `Mutex` で保護する。ロックはレコード1件の参照・置換の間だけ保持し、
//! ストレージ呼び出しをまたいで保持することはない。
//!
//! `grant_audited` / `revoke_audited` は遷移と監査ログへの追記を同じロックの下で行う。
//! 追記が成功した場合のみレコードを置き換えるため、記録されない遷移は存在せず、
//! ログ上の遷移の順序はレジストリへの反映順と一致する。
//! 状態はメモリ上のみに存在し、プロセス再起動で失われる。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use nexus_types::ConsentRecord;

use crate::audit::{AuditEntry, AuditEvent};
use crate::patient::PatientId;
use crate::sink::AuditSink;
use crate::AuditError;

/// 現在時刻の取得元。
pub trait Clock: Send + Sync {
    /// 現在時刻（UTC）
    fn now(&self) -> DateTime<Utc>;
}

/// システム時計
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 患者ごとの同意状態（状態機械上の状態）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    /// grant/revokeが一度も呼ばれていない
    NoRecord,
    /// 同意済み
    Granted,
    /// 撤回済み
    Revoked,
}

/// 同意状態のレジストリ。
pub struct ConsentRegistry {
    records: Mutex<HashMap<PatientId, ConsentRecord>>,
    clock: Arc<dyn Clock>,
}

impl ConsentRegistry {
    /// システム時計を使うレジストリを構築する。
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 任意の時計を使うレジストリを構築する。
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// レジストリの時計による現在時刻。
    /// 監査イベントのタイムスタンプもこの時計から取る。
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 同意を付与する。既存レコードは無条件に上書きされる。
    /// 繰り返し呼んでもタイムスタンプが更新されるだけで、状態は変わらない。
    pub fn grant(&self, patient_id: &PatientId) -> ConsentRecord {
        self.transition(patient_id, true)
    }

    /// 同意を撤回する。
    pub fn revoke(&self, patient_id: &PatientId) -> ConsentRecord {
        self.transition(patient_id, false)
    }

    /// 同意を付与し、CONSENT_GRANTED を `sink` に追記する。
    /// 追記に失敗した場合はレコードを変更しない。
    pub fn grant_audited(
        &self,
        patient_id: &PatientId,
        sink: &dyn AuditSink,
    ) -> Result<(ConsentRecord, AuditEntry), AuditError> {
        self.transition_audited(patient_id, true, sink)
    }

    /// 同意を撤回し、CONSENT_REVOKED を `sink` に追記する。
    /// 追記に失敗した場合はレコードを変更しない。
    pub fn revoke_audited(
        &self,
        patient_id: &PatientId,
        sink: &dyn AuditSink,
    ) -> Result<(ConsentRecord, AuditEntry), AuditError> {
        self.transition_audited(patient_id, false, sink)
    }

    /// 現在のレコードを参照する。レコードがなければ `None`。
    pub fn get(&self, patient_id: &PatientId) -> Option<ConsentRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(patient_id)
            .cloned()
    }

    /// 患者の状態機械上の状態を返す。
    pub fn state(&self, patient_id: &PatientId) -> ConsentState {
        match self.get(patient_id) {
            None => ConsentState::NoRecord,
            Some(record) if record.granted => ConsentState::Granted,
            Some(_) => ConsentState::Revoked,
        }
    }

    /// レコードを持つ患者数
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// レコードが1件もないか
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(&self, patient_id: &PatientId, granted: bool) -> ConsentRecord {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = self.next_record(&records, patient_id, granted);
        records.insert(patient_id.clone(), record.clone());
        record
    }

    fn transition_audited(
        &self,
        patient_id: &PatientId,
        granted: bool,
        sink: &dyn AuditSink,
    ) -> Result<(ConsentRecord, AuditEntry), AuditError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = self.next_record(&records, patient_id, granted);
        let entry = sink.append(AuditEvent::consent_changed(&record))?;
        records.insert(patient_id.clone(), record.clone());
        tracing::debug!(patient_id = %patient_id, granted, seq = entry.seq, "同意状態を更新");
        Ok((record, entry))
    }

    /// 遷移後のレコードを組み立てる。
    /// 時計が巻き戻っても updated_at は前回値を下回らない。
    fn next_record(
        &self,
        records: &HashMap<PatientId, ConsentRecord>,
        patient_id: &PatientId,
        granted: bool,
    ) -> ConsentRecord {
        let now = self.clock.now();
        let updated_at = match records.get(patient_id) {
            Some(previous) if previous.updated_at > now => previous.updated_at,
            _ => now,
        };
        ConsentRecord {
            patient_id: patient_id.to_string(),
            granted,
            updated_at,
        }
    }
}

impl Default for ConsentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
