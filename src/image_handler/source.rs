//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `ImageSource` 表示 URI 分类后的来源语义（远程 / 本地）
//! - `RawImageData` 表示已读取但未解码的字节，以及类型提示
//! - `PixelBuffer` 表示解码后的 RGBA8 像素，只在解码/重编码阶段内部流转
//! - `ImageType` 表示目标输出格式，按单次调用传递，不挂在实例上

use std::fmt;
use std::path::PathBuf;

use image::RgbaImage;

use super::ImageError;

const FILE_URI_PREFIX: &str = "file://";

/// 图片输入来源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// 网络地址来源。
    Remote(reqwest::Url),
    /// 本地文件路径来源（已去掉 `file://` 前缀）。
    Local(PathBuf),
}

impl ImageSource {
    /// 对 URI 分类：包含 `http://` / `https://` 标记视为远程，其余视为本地路径。
    ///
    /// 本地路径按原样保留（文件名允许首尾空白），仅去掉 `file://` 前缀。
    ///
    /// # 示例
    /// ```rust
    /// use image_base64::image_handler::ImageSource;
    ///
    /// let source = ImageSource::resolve("https://example.com/a.png")?;
    /// assert!(matches!(source, ImageSource::Remote(_)));
    ///
    /// let source = ImageSource::resolve("/tmp/a.png")?;
    /// assert!(matches!(source, ImageSource::Local(_)));
    /// # Ok::<(), image_base64::image_handler::ImageError>(())
    /// ```
    pub fn resolve(uri: &str) -> Result<Self, ImageError> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(ImageError::UriResolution("URI 为空".to_string()));
        }

        if Self::has_http_scheme_marker(trimmed) {
            let url = reqwest::Url::parse(trimmed)
                .map_err(|e| ImageError::UriResolution(format!("URL 格式错误：{}", e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ImageError::UriResolution(format!(
                    "仅支持 HTTP/HTTPS：{}",
                    url.scheme()
                )));
            }
            if url.host_str().is_none() {
                return Err(ImageError::UriResolution("URL 缺少主机地址".to_string()));
            }
            return Ok(Self::Remote(url));
        }

        let path = match uri.get(..FILE_URI_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(FILE_URI_PREFIX) => {
                &uri[FILE_URI_PREFIX.len()..]
            }
            _ => uri,
        };

        if path.trim().is_empty() {
            return Err(ImageError::UriResolution(format!("无效的本地路径：{}", uri)));
        }

        Ok(Self::Local(PathBuf::from(path)))
    }

    fn has_http_scheme_marker(uri: &str) -> bool {
        let lower = uri.to_ascii_lowercase();
        lower.contains("http://") || lower.contains("https://")
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local(_) => "local",
        }
    }
}

/// 输出格式（同时也是 MIME 类型标签）。
///
/// 未知或缺失的类型提示一律回退为 PNG。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ImageType {
    #[default]
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageType {
    /// 严格匹配受支持的 MIME；忽略大小写和 `;` 之后的参数。
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next()?.trim().to_ascii_lowercase();
        match base.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// 将类型提示归一化到 {png, jpeg, webp}，其余回退为默认值。
    pub fn normalize(hint: Option<&str>) -> Self {
        match hint {
            Some(mime) => Self::from_mime(mime).unwrap_or_else(|| {
                log::warn!("⚠️ 不支持的图片类型 {}，回退为 {}", mime, Self::default());
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// 加载阶段输出：原始字节与类型提示。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 类型提示：远程取自 `content-type`，本地取自图片自身签名。
    pub(crate) type_hint: Option<String>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码阶段输出：固定 RGBA8（非预乘 alpha）的像素缓冲。
pub(crate) struct PixelBuffer {
    pub(crate) image: RgbaImage,
}

impl PixelBuffer {
    pub(crate) fn width(&self) -> u32 {
        self.image.width()
    }

    pub(crate) fn height(&self) -> u32 {
        self.image.height()
    }
}
