//! # APIキー認証
//!
//! `X-API-Key` ヘッダーの値を静的テーブルでロールに解決する。
//! 未解決のキーはアクセス判定に進む前に拒否する。

use std::collections::HashMap;

use axum::http::HeaderMap;
use nexus_core::UploadPolicy;
use nexus_types::Role;

use crate::error::GatewayError;

/// APIキーのヘッダー名
pub const API_KEY_HEADER: &str = "x-api-key";

/// `API_KEYS` 未設定時のテーブル
pub const DEFAULT_API_KEYS: &str = "admin-key:admin,user-key:user";

/// APIキーからロールへの静的テーブル。
#[derive(Debug, Clone, Default)]
pub struct ApiKeyTable {
    keys: HashMap<String, Role>,
}

impl ApiKeyTable {
    /// `key:role,key:role` 形式の文字列からテーブルを構築する。
    pub fn parse(table: &str) -> anyhow::Result<Self> {
        let mut keys = HashMap::new();
        for pair in table.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, role) = pair.split_once(':').ok_or_else(|| {
                anyhow::anyhow!("API_KEYSの要素は key:role 形式である必要があります: {pair}")
            })?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("API_KEYSに空のキーが含まれています");
            }
            let role: Role = role.parse()?;
            if keys.insert(key.to_string(), role).is_some() {
                anyhow::bail!("API_KEYSのキーが重複しています: {key}");
            }
        }
        Ok(Self { keys })
    }

    /// キーをロールに解決する。
    pub fn resolve_role(&self, api_key: &str) -> Option<Role> {
        self.keys.get(api_key).copied()
    }

    /// 登録されたキーの数
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// キーが1つもないか
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// アップロードリクエストのロールを解決する。
    ///
    /// - ヘッダーがあるがキーが無効 → Unauthorized
    /// - ヘッダーがない → `RequireAdmin` では Unauthorized、`ConsentOnly` では `None`
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        policy: UploadPolicy,
    ) -> Result<Option<Role>, GatewayError> {
        match headers.get(API_KEY_HEADER) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|key| self.resolve_role(key))
                .map(Some)
                .ok_or_else(|| GatewayError::Unauthorized("無効なAPIキーです".to_string())),
            None if policy == UploadPolicy::RequireAdmin => Err(GatewayError::Unauthorized(
                "X-API-Keyヘッダーが必要です".to_string(),
            )),
            None => Ok(None),
        }
    }
}
