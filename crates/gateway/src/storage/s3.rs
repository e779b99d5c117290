//! # S3互換 Object Storage 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用する実装。

use super::ObjectStorage;
use crate::error::GatewayError;

/// S3互換ストレージによるObject Storage実装。
pub struct S3ObjectStorage {
    bucket: s3::Bucket,
    bucket_name: String,
    /// バケット作成時に使用する接続情報
    region: s3::Region,
    credentials: s3::creds::Credentials,
}

/// エンドポイントからリージョンを決定する。
///
/// `S3_REGION` が指定されていればそれを使う。AWS S3エンドポイント（s3.REGION.amazonaws.com）
/// からは自動検出し、それ以外のエンドポイントでは us-east-1 を使う。
pub(crate) fn detect_region(endpoint: &str, explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| {
        endpoint
            .find("s3.")
            .and_then(|start| {
                let rest = &endpoint[start + 3..];
                rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
            })
            .unwrap_or_else(|| "us-east-1".to_string())
    })
}

impl S3ObjectStorage {
    /// 接続情報からバケットを初期化する。
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
        region: String,
    ) -> anyhow::Result<Self> {
        let region = s3::Region::Custom {
            region,
            endpoint: endpoint.to_string(),
        };

        let credentials = s3::creds::Credentials::new(
            Some(access_key),
            Some(secret_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(bucket_name, region.clone(), credentials.clone())?
            .with_path_style();

        Ok(Self {
            bucket: *bucket,
            bucket_name: bucket_name.to_string(),
            region,
            credentials,
        })
    }

    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint = std::env::var("S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let access_key =
            std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin123".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "medical-data".to_string());
        let region = detect_region(&endpoint, std::env::var("S3_REGION").ok());

        tracing::info!(
            s3_endpoint = %endpoint,
            bucket = %bucket_name,
            region = %region,
            "S3互換ストレージを設定"
        );

        Self::new(&endpoint, &access_key, &secret_key, &bucket_name, region)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    async fn bucket_exists(&self) -> Result<bool, GatewayError> {
        self.bucket
            .exists()
            .await
            .map_err(|e| GatewayError::Storage(format!("バケットの存在確認に失敗: {e}")))
    }

    async fn create_bucket(&self) -> Result<(), GatewayError> {
        let response = s3::Bucket::create_with_path_style(
            &self.bucket_name,
            self.region.clone(),
            self.credentials.clone(),
            s3::BucketConfiguration::default(),
        )
        .await
        .map_err(|e| GatewayError::Storage(format!("バケット作成に失敗: {e}")))?;

        if !response.success() {
            return Err(GatewayError::Storage(format!(
                "バケット作成に失敗: HTTP {} - {}",
                response.response_code, response.response_text
            )));
        }
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await
            .map_err(|e| GatewayError::Storage(format!("オブジェクト書き込みに失敗: {e}")))?;

        // fail-on-err を無効にしているため、ステータスコードを自前で確認する
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(GatewayError::Storage(format!(
                "オブジェクト書き込みに失敗: HTTP {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// AWSエンドポイントからリージョンが検出されることを確認
    #[test]
    fn test_detect_region() {
        assert_eq!(
            detect_region("https://s3.ap-northeast-1.amazonaws.com", None),
            "ap-northeast-1"
        );
        assert_eq!(detect_region("http://localhost:9000", None), "us-east-1");
        assert_eq!(
            detect_region("http://localhost:9000", Some("eu-west-1".to_string())),
            "eu-west-1"
        );
    }

    /// 接続なしでバケットが構築できることを確認
    #[test]
    fn test_new_binds_bucket_name() {
        let storage = S3ObjectStorage::new(
            "http://localhost:9000",
            "minioadmin",
            "minioadmin123",
            "medical-data",
            "us-east-1".to_string(),
        )
        .unwrap();
        assert_eq!(storage.bucket_name(), "medical-data");
    }
}
