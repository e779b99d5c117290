//! # Object Storage
//!
//! 同意済み患者のデータを保存するオブジェクトストレージの抽象インターフェース。
//! Gatewayは書き込むかどうかを判断するだけで、ストレージのプロトコルは実装しない。
//!
//! - S3互換ストレージ実装は `s3` サブモジュール（feature `vendor-aws`）
//! - ローカルファイルシステム実装は `local` サブモジュール（feature `vendor-local`）

#[cfg(feature = "vendor-aws")]
pub mod s3;

#[cfg(feature = "vendor-local")]
pub mod local;

#[cfg(feature = "vendor-aws")]
pub use s3::S3ObjectStorage;

#[cfg(feature = "vendor-local")]
pub use local::LocalObjectStorage;

use nexus_core::PatientId;

use crate::error::GatewayError;

/// アップロードペイロードのContent-Type
pub const OCTET_STREAM: &str = "application/octet-stream";

/// 拡張子が省略された場合のデフォルト
pub const DEFAULT_EXTENSION: &str = "enc";

/// 拡張子の最大長
const MAX_EXTENSION_LEN: usize = 8;

/// オブジェクトストレージの抽象インターフェース。
///
/// 実装は1つのバケットに束縛される。
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 束縛されたバケット名
    fn bucket_name(&self) -> &str;

    /// バケットが存在するか
    async fn bucket_exists(&self) -> Result<bool, GatewayError>;

    /// バケットを作成する。
    async fn create_bucket(&self) -> Result<(), GatewayError>;

    /// オブジェクトを書き込む。既存オブジェクトは上書きされる。
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), GatewayError>;
}

/// 患者のスキャンデータのオブジェクトキー `{patient_id}/scan.<ext>`
pub fn object_key(patient_id: &PatientId, ext: &str) -> String {
    format!("{patient_id}/scan.{ext}")
}

/// クエリで指定された拡張子を検証する。1〜8文字のASCII英数字のみ許可。
pub fn validate_extension(ext: Option<&str>) -> Result<&str, GatewayError> {
    let ext = ext.unwrap_or(DEFAULT_EXTENSION);
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(GatewayError::BadRequest(format!(
            "拡張子は1〜{MAX_EXTENSION_LEN}文字の英数字である必要があります: {ext:?}"
        )));
    }
    Ok(ext)
}
