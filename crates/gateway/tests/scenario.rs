//! Gateway全体をTCP越しに動かすシナリオテスト。
//!
//! ルーターを 127.0.0.1 のエフェメラルポートで起動し、reqwest で叩く。
//! 監査ログは実ファイルに書き、最後にハッシュチェーンを検証する。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nexus_core::audit::verify_chain;
use nexus_core::sink::{read_entries, verify_file};
use nexus_core::{
    AuditEvent, AuditEventKind, AuditSink, ConsentRegistry, FileAuditSink, UploadPolicy,
};
use nexus_gateway::auth::{ApiKeyTable, DEFAULT_API_KEYS};
use nexus_gateway::config::GatewayState;
use nexus_gateway::error::GatewayError;
use nexus_gateway::storage::ObjectStorage;
use serde_json::Value;

#[derive(Default)]
struct RecordingStorage {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    unreachable: AtomicBool,
}

struct SharedStorage(Arc<RecordingStorage>);

#[async_trait::async_trait]
impl ObjectStorage for SharedStorage {
    fn bucket_name(&self) -> &str {
        "medical-data"
    }

    async fn bucket_exists(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }

    async fn create_bucket(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), GatewayError> {
        if self.0.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Storage("endpoint unreachable".to_string()));
        }
        self.0
            .objects
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.to_vec()));
        Ok(())
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    storage: Arc<RecordingStorage>,
    audit_path: PathBuf,
}

impl Harness {
    async fn start(max_upload_size: u64) -> Self {
        let audit_path = std::env::temp_dir()
            .join(format!("nexus-scenario-{}", uuid::Uuid::new_v4()))
            .join("audit.log");
        let storage = Arc::new(RecordingStorage::default());

        let state = Arc::new(GatewayState {
            registry: ConsentRegistry::new(),
            audit: Arc::new(FileAuditSink::open(&audit_path).unwrap()),
            storage: Box::new(SharedStorage(storage.clone())),
            api_keys: ApiKeyTable::parse(DEFAULT_API_KEYS).unwrap(),
            upload_policy: UploadPolicy::RequireAdmin,
            max_upload_size,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = nexus_gateway::build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            storage,
            audit_path,
        }
    }

    async fn post(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn upload(
        &self,
        patient_id: &str,
        key: Option<&str>,
        body: Vec<u8>,
    ) -> reqwest::Response {
        let mut req = self
            .client
            .post(format!("{}/data/upload/{patient_id}", self.base))
            .body(body);
        if let Some(key) = key {
            req = req.header("X-API-Key", key);
        }
        req.send().await.unwrap()
    }

    fn audit_kinds(&self) -> Vec<AuditEventKind> {
        read_entries(&self.audit_path)
            .unwrap()
            .into_iter()
            .map(|e| e.event.kind)
            .collect()
    }
}

/// 付与・アクセス・撤回・未登録患者の一連の流れ
#[tokio::test]
async fn test_consent_lifecycle_over_http() {
    let gw = Harness::start(1024).await;

    let (status, body) = gw.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = gw.post("/consent/grant?patient_id=p1").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "granted");
    assert_eq!(body["patient_id"], "p1");

    let (_, body) = gw.get("/data/access/p1").await;
    assert_eq!(body["access"], "granted");

    let (_, body) = gw.post("/consent/revoke?patient_id=p1").await;
    assert_eq!(body["status"], "revoked");

    let (status, body) = gw.get("/data/access/p1").await;
    assert_eq!(status, 200);
    assert_eq!(body["access"], "denied");
    assert_eq!(body["reason"], "no valid consent");

    let (_, body) = gw.get("/data/access/p2").await;
    assert_eq!(body["access"], "denied");

    let (_, body) = gw.get("/consent/p2").await;
    assert_eq!(body["granted"], false);
    assert!(body["updated_at"].is_null());

    assert_eq!(
        gw.audit_kinds(),
        vec![
            AuditEventKind::ConsentGranted,
            AuditEventKind::AccessGranted,
            AuditEventKind::ConsentRevoked,
            AuditEventKind::AccessDenied,
            AuditEventKind::AccessDenied,
            AuditEventKind::ConsentCheck,
        ]
    );

    let entries = read_entries(&gw.audit_path).unwrap();
    assert!(verify_chain(&entries).unwrap().intact);
}

/// アップロードのロール・同意・ストレージ失敗の各分岐
#[tokio::test]
async fn test_upload_paths_over_http() {
    let gw = Harness::start(1024).await;

    let resp = gw.upload("p1", None, b"x".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = gw.upload("p1", Some("admin-key"), b"x".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "denied");
    assert_eq!(body["reason"], "no valid consent");

    gw.post("/consent/grant?patient_id=p1").await;

    let resp = gw.upload("p1", Some("user-key"), b"x".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "insufficient privileges");

    let resp = gw.upload("p1", Some("admin-key"), b"ciphertext".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["object"], "p1/scan.enc");
    assert_eq!(body["encryption"], "client-side");
    assert_eq!(
        gw.storage.objects.lock().unwrap().clone(),
        vec![("p1/scan.enc".to_string(), b"ciphertext".to_vec())]
    );

    gw.storage.unreachable.store(true, Ordering::SeqCst);
    let resp = gw.upload("p1", Some("admin-key"), b"again".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");

    // ストレージ失敗後も同意は維持される
    let (_, body) = gw.get("/consent/p1").await;
    assert_eq!(body["granted"], true);

    assert_eq!(
        gw.audit_kinds(),
        vec![
            AuditEventKind::UploadDenied,
            AuditEventKind::ConsentGranted,
            AuditEventKind::UploadDenied,
            AuditEventKind::AccessGranted,
            AuditEventKind::UploadOk,
            AuditEventKind::AccessGranted,
            AuditEventKind::UploadError,
            AuditEventKind::ConsentCheck,
        ]
    );
}

/// 上限を超えるペイロードは判定前に拒否され、記録もストレージ書き込みも行われない
#[tokio::test]
async fn test_upload_body_limit_over_http() {
    let gw = Harness::start(16).await;
    gw.post("/consent/grant?patient_id=p1").await;

    let resp = gw.upload("p1", Some("admin-key"), vec![0u8; 64]).await;
    assert_eq!(resp.status().as_u16(), 413);
    assert!(gw.storage.objects.lock().unwrap().is_empty());
    assert_eq!(gw.audit_kinds(), vec![AuditEventKind::ConsentGranted]);
}

/// 再起動後も既存の監査ログにチェーンが継続される
#[tokio::test]
async fn test_audit_chain_survives_reopen() {
    let gw = Harness::start(1024).await;
    gw.post("/consent/grant?patient_id=p1").await;
    gw.get("/data/access/p1").await;

    let sink = FileAuditSink::open(&gw.audit_path).unwrap();
    let event = AuditEvent::bucket_created("medical-data", chrono::Utc::now());
    let entry = sink.append(event).unwrap();
    assert_eq!(entry.seq, 2);

    let verification = verify_file(&gw.audit_path).unwrap();
    assert_eq!(verification.total_entries, 3);
    assert!(verification.intact);
}
