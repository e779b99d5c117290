//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use nexus_core::{AuditSink, ConsentRegistry, UploadPolicy};

use crate::auth::{ApiKeyTable, DEFAULT_API_KEYS};
use crate::storage::ObjectStorage;

/// アップロード最大サイズのデフォルト（10 MiB）
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// ストレージバックエンドの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3互換ストレージ（feature `vendor-aws`）
    S3,
    /// ローカルファイルシステム（feature `vendor-local`）
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            other => anyhow::bail!("未知のSTORAGE_BACKENDです: {other}（s3 / local）"),
        }
    }
}

/// 起動時に環境変数から読み込む設定。
/// ストレージの接続情報は各ストレージ実装の `from_env` が読み込む。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けアドレス
    pub bind_addr: String,
    /// ストレージバックエンド
    pub storage_backend: StorageBackend,
    /// 監査ログのパス
    pub audit_log_path: PathBuf,
    /// APIキーテーブル
    pub api_keys: ApiKeyTable,
    /// アップロード時のロール要件
    pub upload_policy: UploadPolicy,
    /// アップロード最大サイズ（バイト）
    pub max_upload_size: u64,
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数参照関数から構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let storage_backend = lookup("STORAGE_BACKEND")
            .as_deref()
            .unwrap_or("s3")
            .parse()?;
        let audit_log_path = lookup("AUDIT_LOG_PATH")
            .unwrap_or_else(|| "logs/audit.log".to_string())
            .into();
        let api_keys = ApiKeyTable::parse(
            lookup("API_KEYS")
                .as_deref()
                .unwrap_or(DEFAULT_API_KEYS),
        )?;
        let upload_policy = lookup("UPLOAD_POLICY")
            .as_deref()
            .unwrap_or("require-admin")
            .parse()?;
        let max_upload_size = match lookup("MAX_UPLOAD_SIZE") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                anyhow::anyhow!("MAX_UPLOAD_SIZEは整数である必要があります: {raw} ({e})")
            })?,
            None => DEFAULT_MAX_UPLOAD_SIZE,
        };
        if max_upload_size == 0 {
            anyhow::bail!("MAX_UPLOAD_SIZEは1以上である必要があります");
        }

        Ok(Self {
            bind_addr,
            storage_backend,
            audit_log_path,
            api_keys,
            upload_policy,
            max_upload_size,
        })
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// 同意状態のレジストリ
    pub registry: ConsentRegistry,
    /// 監査ログの追記先
    pub audit: Arc<dyn AuditSink>,
    /// オブジェクトストレージ（トレイトで抽象化）
    pub storage: Box<dyn ObjectStorage>,
    /// APIキーテーブル
    pub api_keys: ApiKeyTable,
    /// アップロード時のロール要件
    pub upload_policy: UploadPolicy,
    /// アップロード最大サイズ（バイト）
    pub max_upload_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    /// 未設定時のデフォルト値を確認
    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.audit_log_path, PathBuf::from("logs/audit.log"));
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.upload_policy, UploadPolicy::RequireAdmin);
        assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9999"),
            ("STORAGE_BACKEND", "local"),
            ("API_KEYS", "ops:admin"),
            ("UPLOAD_POLICY", "consent-only"),
            ("MAX_UPLOAD_SIZE", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9999");
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.api_keys.len(), 1);
        assert_eq!(config.upload_policy, UploadPolicy::ConsentOnly);
        assert_eq!(config.max_upload_size, 1024);
    }

    /// 不正な値で起動が失敗することを確認
    #[test]
    fn test_malformed_values_fail() {
        for vars in [
            [("STORAGE_BACKEND", "gcs")],
            [("UPLOAD_POLICY", "open")],
            [("MAX_UPLOAD_SIZE", "ten")],
            [("MAX_UPLOAD_SIZE", "0")],
            [("API_KEYS", "k:root")],
        ] {
            assert!(GatewayConfig::from_lookup(lookup(&vars)).is_err(), "{vars:?}");
        }
    }
}
