//! # NEXUS CLI
//!
//! Gatewayの同意APIを呼び出すクライアントと、監査ログのオフライン検証。
//!
//! Usage:
//!   nexus-cli grant <patient>
//!   nexus-cli revoke <patient>
//!   nexus-cli status <patient>
//!   nexus-cli access <patient>
//!   nexus-cli --api-key <key> upload <patient> <file> [--ext <ext>]
//!   nexus-cli verify-audit <path>

mod client;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nexus_core::sink::verify_file;
use nexus_core::ChainVerification;
use serde::Serialize;

use crate::client::{GatewayClient, Reply};

#[derive(Parser, Debug)]
#[command(name = "nexus-cli")]
#[command(version)]
#[command(about = "NEXUS consent gateway client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GatewayのベースURL
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    gateway: String,

    /// アップロード時に送るAPIキー
    #[arg(long, global = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// 同意を付与する
    Grant {
        patient_id: String,
    },

    /// 同意を撤回する
    Revoke {
        patient_id: String,
    },

    /// 同意状態を参照する
    Status {
        patient_id: String,
    },

    /// 読み取りアクセスの可否を問い合わせる
    Access {
        patient_id: String,
    },

    /// 暗号化済みファイルをアップロードする
    Upload {
        patient_id: String,

        /// アップロードするファイル（クライアント側で暗号化済みであること）
        file: PathBuf,

        /// オブジェクトキーの拡張子（省略時は enc）
        #[arg(long)]
        ext: Option<String>,
    },

    /// 監査ログのハッシュチェーンを検証する（Gatewayには接続しない）
    VerifyAudit {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let client = GatewayClient::new(&cli.gateway, cli.api_key)?;
    match cli.command {
        Commands::Grant { patient_id } => print_reply(client.grant(&patient_id).await?),
        Commands::Revoke { patient_id } => print_reply(client.revoke(&patient_id).await?),
        Commands::Status { patient_id } => print_reply(client.status(&patient_id).await?),
        Commands::Access { patient_id } => print_reply(client.access(&patient_id).await?),
        Commands::Upload {
            patient_id,
            file,
            ext,
        } => {
            let payload = std::fs::read(&file)
                .with_context(|| format!("ファイルを読み込めません: {}", file.display()))?;
            eprintln!(
                "{} bytes を {} にアップロードします",
                payload.len(),
                client.base_url()
            );
            print_reply(client.upload(&patient_id, payload, ext.as_deref()).await?)
        }
        Commands::VerifyAudit { path } => Ok(if verify_audit(&path)? {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }),
    }
}

/// 応答を整形して標準出力に書く。HTTPステータスが成功でなければ非ゼロで終了する。
fn print_reply<T: Serialize>(reply: Reply<T>) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    if reply.status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("HTTP {}", reply.status);
        Ok(ExitCode::FAILURE)
    }
}

/// 監査ログを検証して結果を表示する。チェーンが無傷なら `true`。
fn verify_audit(path: &Path) -> anyhow::Result<bool> {
    let verification = verify_file(path)
        .with_context(|| format!("監査ログを検証できません: {}", path.display()))?;
    println!("{}", summarize(&verification));
    Ok(verification.intact)
}

fn summarize(verification: &ChainVerification) -> String {
    match verification.first_break_at {
        None => format!("OK: {} entries, chain intact", verification.total_entries),
        Some(seq) => format!(
            "BROKEN: {} entries, first break at seq {seq}",
            verification.total_entries
        ),
    }
}
