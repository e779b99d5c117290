//! # ローカルファイルシステム Object Storage 実装
//!
//! MinIO等を用意できない開発環境向け。
//! バケットは `{root}/{bucket}` ディレクトリ、オブジェクトはその下のファイルとして保存する。

use std::path::PathBuf;

use super::ObjectStorage;
use crate::error::GatewayError;

/// ローカルディレクトリによるObject Storage実装。
pub struct LocalObjectStorage {
    root: PathBuf,
    bucket_name: String,
}

impl LocalObjectStorage {
    /// ルートディレクトリとバケット名から構築する。
    pub fn new(root: impl Into<PathBuf>, bucket_name: &str) -> Self {
        Self {
            root: root.into(),
            bucket_name: bucket_name.to_string(),
        }
    }

    /// 環境変数から構築する。
    pub fn from_env() -> Self {
        let root =
            std::env::var("LOCAL_STORAGE_ROOT").unwrap_or_else(|_| "data/objects".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "medical-data".to_string());
        tracing::info!(root = %root, bucket = %bucket_name, "ローカルストレージを設定");
        Self::new(root, &bucket_name)
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket_name)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for LocalObjectStorage {
    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    async fn bucket_exists(&self) -> Result<bool, GatewayError> {
        tokio::fs::try_exists(self.bucket_dir())
            .await
            .map_err(|e| GatewayError::Storage(format!("バケットの存在確認に失敗: {e}")))
    }

    async fn create_bucket(&self) -> Result<(), GatewayError> {
        tokio::fs::create_dir_all(self.bucket_dir())
            .await
            .map_err(|e| GatewayError::Storage(format!("バケット作成に失敗: {e}")))
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), GatewayError> {
        let path = self.bucket_dir().join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::Storage(format!("ディレクトリ作成に失敗: {e}")))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| GatewayError::Storage(format!("オブジェクト書き込みに失敗: {e}")))
    }
}
