//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义宿主侧统一的 `AppError` 枚举，替代 `main` 中分散的
//! `.map_err(|e| e.to_string())`、`expect()` 等不一致模式。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ConversionError` / `ImageError` 提供 `From` 转换，无需手动 map。
//! - JSON 输出走 `bridge::BridgeError`，这里只负责文本输出。

use crate::image_handler::{ConversionError, ImageError};

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片转换流水线错误（加载 / 解码 / 重编码 / Base64）
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// 配置不合法
    #[error("配置错误: {0}")]
    Config(#[from] ImageError),

    /// 标准输出写入等 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 输出失败
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}
