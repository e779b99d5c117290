//! # 患者ID
//!
//! 患者IDは呼び出し側が与える不透明な文字列として扱う。
//! 形式は検証しないが、空のIDとオブジェクトキー `{patient_id}/scan.<ext>` を壊す値は拒否する。

use std::fmt;

use crate::ConsentError;

/// 患者IDの最大長（バイト）
pub const MAX_PATIENT_ID_LEN: usize = 128;

/// 検証済みの患者ID。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientId(String);

impl PatientId {
    /// 文字列を患者IDとして検証する。
    ///
    /// 拒否するもの:
    /// - 空文字列、空白のみ
    /// - `MAX_PATIENT_ID_LEN` を超える長さ
    /// - `/`, `\`, 制御文字を含むもの
    /// - `.` と `..`
    pub fn parse(raw: &str) -> Result<Self, ConsentError> {
        if raw.trim().is_empty() {
            return Err(ConsentError::InvalidPatientId(
                "患者IDが空です".to_string(),
            ));
        }
        if raw.len() > MAX_PATIENT_ID_LEN {
            return Err(ConsentError::InvalidPatientId(format!(
                "患者IDが長すぎます: {} bytes (上限: {} bytes)",
                raw.len(),
                MAX_PATIENT_ID_LEN
            )));
        }
        if raw == "." || raw == ".." {
            return Err(ConsentError::InvalidPatientId(format!(
                "患者IDに `{raw}` は使用できません"
            )));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| matches!(c, '/' | '\\') || c.is_control())
        {
            return Err(ConsentError::InvalidPatientId(format!(
                "患者IDに使用できない文字が含まれています: {c:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// 文字列として参照する。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PatientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
