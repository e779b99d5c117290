//! # エンドポイントテスト用共通ヘルパー
//!
//! モックストレージ・監査ログとテスト用GatewayStateを提供する。

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nexus_core::{
    AuditEntry, AuditError, AuditEvent, AuditSink, ConsentRegistry, MemoryAuditSink,
    UploadPolicy,
};

use crate::auth::{ApiKeyTable, DEFAULT_API_KEYS};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::storage::ObjectStorage;

/// テスト用のモックObjectStorage。
/// 書き込まれたオブジェクトを記録し、`fail` で失敗させられる。
#[derive(Default)]
pub struct MockObjectStorage {
    pub objects: Mutex<Vec<(String, Vec<u8>)>>,
    pub bucket_created: AtomicBool,
    pub fail: AtomicBool,
}

impl MockObjectStorage {
    pub fn failing() -> Self {
        let storage = Self::default();
        storage.fail.store(true, Ordering::SeqCst);
        storage
    }
}

#[async_trait::async_trait]
impl ObjectStorage for Arc<MockObjectStorage> {
    fn bucket_name(&self) -> &str {
        "medical-data"
    }

    async fn bucket_exists(&self) -> Result<bool, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Storage("connection refused".to_string()));
        }
        Ok(self.bucket_created.load(Ordering::SeqCst))
    }

    async fn create_bucket(&self) -> Result<(), GatewayError> {
        self.bucket_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Storage("connection refused".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// テスト用の監査ログ。`fail` で追記を失敗させられる。
/// 追記済みエントリの参照は `MemoryAuditSink` のメソッドをそのまま使う。
#[derive(Default)]
pub struct TestAuditSink {
    entries: MemoryAuditSink,
    pub fail: AtomicBool,
}

impl Deref for TestAuditSink {
    type Target = MemoryAuditSink;

    fn deref(&self) -> &MemoryAuditSink {
        &self.entries
    }
}

impl AuditSink for TestAuditSink {
    fn append(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::Io(std::io::Error::other("disk full")));
        }
        self.entries.append(event)
    }
}

/// テスト用のGatewayStateと、検査用のハンドル。
pub struct TestGateway {
    pub state: Arc<GatewayState>,
    pub audit: Arc<TestAuditSink>,
    pub storage: Arc<MockObjectStorage>,
}

/// テスト用GatewayStateを構築するヘルパー
pub fn test_gateway(storage: MockObjectStorage, policy: UploadPolicy) -> TestGateway {
    let audit = Arc::new(TestAuditSink::default());
    let storage = Arc::new(storage);
    let state = Arc::new(GatewayState {
        registry: ConsentRegistry::new(),
        audit: audit.clone(),
        storage: Box::new(storage.clone()),
        api_keys: ApiKeyTable::parse(DEFAULT_API_KEYS).unwrap(),
        upload_policy: policy,
        max_upload_size: 1024,
    });
    TestGateway {
        state,
        audit,
        storage,
    }
}
