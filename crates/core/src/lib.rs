//! # NEXUS Consent Core
//!
//! 患者ごとの同意状態の管理と、それに基づくアクセス判定・監査イベント生成を実装する。
//!
//! ## 処理フロー
//! 1. `ConsentRegistry` が患者IDごとの現在の同意状態を保持する
//! 2. `decide` が同意状態・操作種別・ロールから Allow/Deny を導出し、監査イベントを組み立てる
//! 3. 呼び出し側が Allow の場合のみ副作用（ストレージ書き込み等）を実行する
//! 4. 呼び出し側が判定・結果の監査イベントを `AuditSink` に追記する
//!
//! 判定ロジックは監査ログに書き込まない。書き込みは常に呼び出し側が明示的に行う。

pub mod audit;
pub mod decision;
pub mod patient;
pub mod registry;
pub mod sink;

pub use audit::{AuditChain, AuditEntry, AuditEvent, AuditEventKind, ChainVerification};
pub use decision::{check, decide, evaluate, Decision, DenyReason, Operation, UploadPolicy, Verdict};
pub use patient::PatientId;
pub use registry::{Clock, ConsentRegistry, ConsentState, SystemClock};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};

/// 同意操作のエラー型
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// 患者IDとして受け付けられない値
    #[error("不正な患者ID: {0}")]
    InvalidPatientId(String),
}

/// 監査ログのエラー型
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// ファイル入出力の失敗
    #[error("監査ログの入出力に失敗: {0}")]
    Io(#[from] std::io::Error),
    /// シリアライズの失敗
    #[error("監査エントリのシリアライズに失敗: {0}")]
    Serialize(#[from] serde_json::Error),
    /// 読み込んだ行がエントリとして解釈できない
    #[error("監査ログが破損しています（{line}行目）: {reason}")]
    Corrupt {
        /// 1始まりの行番号
        line: usize,
        /// パース失敗の内容
        reason: String,
    },
}
