//! # Audit Sink
//!
//! 監査イベントの追記先。追記のみ・順序保存・永続。
//!
//! 追記は単一の `Mutex` で直列化する。チェーン状態とファイルは同じロックの下にあり、
//! 書き込みに失敗した場合はチェーンを進めない。

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::audit::{
    verify_chain, AuditChain, AuditEntry, AuditEvent, AuditEventKind, ChainVerification,
};
use crate::AuditError;

/// 監査ログの追記先。
pub trait AuditSink: Send + Sync {
    /// イベントをチェーンに連結して追記し、確定したエントリを返す。
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError>;
}

fn trace_entry(entry: &AuditEntry) {
    tracing::info!(
        target: "audit",
        seq = entry.seq,
        kind = %entry.event.kind,
        "{}",
        entry.event
    );
}

// ---------------------------------------------------------------------------
// ファイル
// ---------------------------------------------------------------------------

/// JSON Lines形式のファイル監査ログ。
/// 1行1エントリ。追記ごとに flush + sync_data する。
pub struct FileAuditSink {
    path: PathBuf,
    inner: Mutex<FileSinkInner>,
}

struct FileSinkInner {
    file: File,
    chain: AuditChain,
}

impl FileAuditSink {
    /// 監査ログを開く。親ディレクトリがなければ作成する。
    /// 既存のログがあれば最終エントリからチェーンを再開する。
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let chain = if path.exists() {
            match read_entries(&path)?.last() {
                Some(last) => AuditChain::resume(last),
                None => AuditChain::new(),
            }
        } else {
            AuditChain::new()
        };

        tracing::info!(
            audit_log = %path.display(),
            next_seq = chain.next_seq(),
            "監査ログを開きました"
        );

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(FileSinkInner { file, chain }),
        })
    }

    /// ログファイルのパス
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut chain = inner.chain.clone();
        let entry = chain.seal(event)?;

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        append_line(&mut inner.file, &line)?;

        inner.chain = chain;
        trace_entry(&entry);
        Ok(entry)
    }
}

/// 追記先のログファイル。
trait LogFile: Write {
    /// 現在の末尾位置
    fn end_offset(&mut self) -> io::Result<u64>;
    /// `len` より後ろを切り捨てる
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    /// 書き込んだ内容を永続化する
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn end_offset(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// 1行を追記して永続化する。
/// 途中で失敗した場合は書きかけの部分を切り捨て、ファイルを追記前の長さに戻す。
fn append_line<F: LogFile>(file: &mut F, line: &[u8]) -> io::Result<()> {
    let start = file.end_offset()?;
    if let Err(e) = write_durably(file, line) {
        if let Err(undo) = file.truncate_to(start) {
            tracing::error!(
                error = %undo,
                offset = start,
                "書きかけの監査エントリを切り捨てられませんでした"
            );
        }
        return Err(e);
    }
    Ok(())
}

fn write_durably<F: LogFile>(file: &mut F, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync()
}

/// 監査ログファイルの全エントリを読み込む。空行は無視する。
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
            line: index + 1,
            reason: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// 監査ログファイルのチェーンを検証する。
pub fn verify_file(path: impl AsRef<Path>) -> Result<ChainVerification, AuditError> {
    verify_chain(&read_entries(path)?)
}

// ---------------------------------------------------------------------------
// メモリ
// ---------------------------------------------------------------------------

/// プロセス内のみの監査ログ。テストと開発用。
#[derive(Default)]
pub struct MemoryAuditSink {
    inner: Mutex<(AuditChain, Vec<AuditEntry>)>,
}

impl MemoryAuditSink {
    /// 空のログ
    pub fn new() -> Self {
        Self::default()
    }

    /// 追記済みの全エントリ
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone()
    }

    /// 追記済みイベントの種類（追記順）
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.entries().iter().map(|e| e.event.kind).collect()
    }

    /// 追記済みエントリ数
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .len()
    }

    /// 1件も追記されていないか
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.0.seal(event)?;
        inner.1.push(entry.clone());
        trace_entry(&entry);
        Ok(entry)
    }
}
