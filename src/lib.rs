//! # 图片转 Base64 工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        宿主（原生模块 / IPC / CLI `image-base64`）         │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<String, BridgeError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (宿主侧统一错误类型)            │
//! │  │                                                       │
//! │  └─ image_handler      URI → 字节 → RGBA8 → 重编码 → Base64│
//! │      ├─ loader         远程 GET / 本地只读文件            │
//! │      ├─ pipeline       解码 + PNG/JPEG/WEBP 质量 100 重编码│
//! │      └─ encoder        标准 Base64                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 宿主侧统一错误类型 `AppError` |
//! | [`image_handler`] | 从 URL / 本地文件加载图片并输出 Base64 |

pub mod error;
pub mod image_handler;

use image_handler::{ConversionError, ImageHandler};

/// 使用默认配置把图片 URI 转为 Base64 文本。
///
/// `uri` 包含 `http://` / `https://` 时按远程地址 GET，否则按本地路径只读打开。
/// 输出格式沿用来源类型（PNG / JPEG / WEBP），其余类型统一输出 PNG，质量固定 100。
///
/// # 示例
/// ```rust,no_run
/// # async fn demo() -> Result<(), image_base64::image_handler::ConversionError> {
/// let base64 = image_base64::get_base64_string("/tmp/photo.png").await?;
/// assert!(!base64.starts_with("data:"));
/// # Ok(())
/// # }
/// ```
pub async fn get_base64_string(uri: &str) -> Result<String, ConversionError> {
    ImageHandler::default().get_base64_string(uri).await
}
