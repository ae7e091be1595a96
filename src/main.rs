//! # 图片转 Base64 工具 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在 `image_handler` 各子模块中，详见 `lib.rs` 架构文档。

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use image_base64::error::AppError;
use image_base64::image_handler::{self, ImageConfig, ImageServiceState, bridge};

#[derive(Parser)]
#[command(name = "image-base64")]
#[command(author, version, about = "Print the Base64 of an image (URL or local path), re-encoded as PNG/JPEG/WEBP", long_about = None)]
struct Cli {
    /// Image URIs: http(s) URLs or local paths (file:// prefix allowed)
    #[arg(required = true)]
    uris: Vec<String>,

    /// Print one JSON object per URI instead of bare Base64 lines
    #[arg(long)]
    json: bool,

    /// Maximum source size in bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Overall download timeout in seconds
    #[arg(long)]
    download_timeout: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Maximum number of redirects to follow
    #[arg(long)]
    max_redirects: Option<usize>,

    /// Refuse loopback / private-network hosts
    #[arg(long)]
    block_private_network: bool,
}

impl Cli {
    fn to_config(&self) -> ImageConfig {
        let mut config = ImageConfig::default();
        if let Some(v) = self.max_file_size {
            config.max_file_size = v;
        }
        if let Some(v) = self.download_timeout {
            config.download_timeout = v;
        }
        if let Some(v) = self.connect_timeout {
            config.connect_timeout = v;
        }
        if let Some(v) = self.max_redirects {
            config.max_redirects = v;
        }
        if self.block_private_network {
            config.allow_private_network = false;
        }
        config
    }
}

#[derive(serde::Serialize)]
struct JsonLine<'a> {
    uri: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<bridge::BridgeError>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            log::error!("运行失败: {err}");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// 逐个转换；返回值表示是否全部成功。
async fn run(cli: &Cli) -> Result<bool, AppError> {
    let state = ImageServiceState::with_config(cli.to_config())?;
    log::info!(
        "setup: image service ready (quality={})",
        image_handler::ENCODE_QUALITY
    );

    let stdout = std::io::stdout();
    let mut all_ok = true;

    for uri in &cli.uris {
        if cli.json {
            let line = match bridge::get_base64_string(&state, uri.clone()).await {
                Ok(base64) => JsonLine {
                    uri,
                    ok: true,
                    base64: Some(base64),
                    error: None,
                },
                Err(err) => {
                    all_ok = false;
                    JsonLine {
                        uri,
                        ok: false,
                        base64: None,
                        error: Some(err),
                    }
                }
            };
            let text = serde_json::to_string(&line)?;
            writeln!(stdout.lock(), "{}", text)?;
            continue;
        }

        match state.get_base64_string(uri).await {
            Ok(base64) => writeln!(stdout.lock(), "{}", base64)?,
            Err(err) => {
                all_ok = false;
                let err = AppError::from(err);
                eprintln!("{uri}: {err}");
            }
        }
    }

    Ok(all_ok)
}
