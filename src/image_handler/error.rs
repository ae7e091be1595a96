//! # 错误模型模块
//!
//! ## 设计思路
//!
//! `ImageError` 描述“出了什么错”，`ConversionError` 额外记录“在哪个阶段出错”。
//! 编排层只会返回 `ConversionError`，调用侧既能按阶段展示，也能按错误分支匹配。

use std::fmt;

/// 转换流水线中的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    /// 解析 URI 并读取原始字节。
    Fetching,
    /// 原始字节解码为像素缓冲。
    Decoding,
    /// 像素缓冲重新编码为 PNG/JPEG/WEBP。
    Reencoding,
    /// 编码结果转为 Base64 文本。
    Encoding,
}

impl ConversionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Decoding => "decoding",
            Self::Reencoding => "reencoding",
            Self::Encoding => "encoding",
        }
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图片转换统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("URI 无法解析：{0}")]
    UriResolution(String),

    /// 非 2xx 状态码、连接失败、超时等网络问题。
    #[error("网络错误：{0}")]
    Fetch(String),

    #[error("文件错误：{0}")]
    FileAccess(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("已取消：{0}")]
    Cancelled(String),

    /// 进程内部状态异常（如锁中毒），与输入无关。
    #[error("内部错误：{0}")]
    Internal(String),
}

impl ImageError {
    /// 稳定的错误码，供宿主侧按码处理。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UriResolution(_) => "E_URI",
            Self::Fetch(_) => "E_FETCH",
            Self::FileAccess(_) => "E_FILE",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::ResourceLimit(_) => "E_LIMIT",
            Self::Cancelled(_) => "E_CANCELLED",
            Self::Internal(_) => "E_INTERNAL",
        }
    }
}

/// 单次转换失败的结果：失败阶段 + 底层原因。
#[derive(Debug, thiserror::Error)]
#[error("{stage} 阶段失败：{source}")]
pub struct ConversionError {
    pub stage: ConversionStage,
    #[source]
    pub source: ImageError,
}

impl ConversionError {
    pub fn new(stage: ConversionStage, source: ImageError) -> Self {
        Self { stage, source }
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}
