//! # Gatewayクライアント
//!
//! NEXUS Gateway のHTTP APIを呼び出す薄いラッパー。

use anyhow::Context;
use nexus_types::*;
use reqwest::Url;
use serde::de::DeserializeOwned;

/// アップロード時にAPIキーを載せるヘッダー
const API_KEY_HEADER: &str = "X-API-Key";

/// Gatewayの応答。
///
/// 拒否（403）やストレージ失敗（502）もJSONで返るため、ステータスと本文をまとめて扱う。
#[derive(Debug)]
pub struct Reply<T> {
    pub status: reqwest::StatusCode,
    pub body: T,
}

pub struct GatewayClient {
    base_url: Url,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("GatewayのURLが不正です: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("GatewayのURLにパスを付けられません: {base_url}");
        }
        Ok(Self {
            base_url,
            api_key,
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// ベースURLにパスセグメントを連結する。患者IDはセグメント単位でパーセントエンコードされる。
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                anyhow::anyhow!("GatewayのURLにパスを付けられません: {}", self.base_url)
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn grant(&self, patient_id: &str) -> anyhow::Result<Reply<ConsentChangeResponse>> {
        let req = self
            .http
            .post(self.endpoint(&["consent", "grant"])?)
            .query(&[("patient_id", patient_id)]);
        send(req).await
    }

    pub async fn revoke(&self, patient_id: &str) -> anyhow::Result<Reply<ConsentChangeResponse>> {
        let req = self
            .http
            .post(self.endpoint(&["consent", "revoke"])?)
            .query(&[("patient_id", patient_id)]);
        send(req).await
    }

    pub async fn status(&self, patient_id: &str) -> anyhow::Result<Reply<ConsentStatusResponse>> {
        let req = self.http.get(self.endpoint(&["consent", patient_id])?);
        send(req).await
    }

    pub async fn access(&self, patient_id: &str) -> anyhow::Result<Reply<AccessResponse>> {
        let req = self
            .http
            .get(self.endpoint(&["data", "access", patient_id])?);
        send(req).await
    }

    /// 暗号化済みペイロードをそのままアップロードする。
    pub async fn upload(
        &self,
        patient_id: &str,
        payload: Vec<u8>,
        ext: Option<&str>,
    ) -> anyhow::Result<Reply<UploadResponse>> {
        let mut req = self
            .http
            .post(self.endpoint(&["data", "upload", patient_id])?)
            .body(payload);
        if let Some(ext) = ext {
            req = req.query(&[("ext", ext)]);
        }
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        send(req).await
    }
}

/// リクエストを送り、JSON本文を解釈する。
/// 本文がJSONでない場合（400/401/413/500 など）はステータスと本文をエラーにする。
async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<Reply<T>> {
    let resp = req.send().await.context("Gatewayへの接続に失敗しました")?;
    let status = resp.status();
    let text = resp.text().await.context("応答の読み取りに失敗しました")?;

    match serde_json::from_str::<T>(&text) {
        Ok(body) => Ok(Reply { status, body }),
        Err(_) if !status.is_success() => {
            anyhow::bail!("Gatewayがエラーを返しました ({status}): {text}")
        }
        Err(e) => Err(e).with_context(|| format!("応答を解釈できません: {text}")),
    }
}
