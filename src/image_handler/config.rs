//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ImageConfig`：下载超时、重定向上限、内网访问策略、
//! 体积与像素上限。输出质量固定为 100，不属于可调项。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的默认值。
//! - `validate` 对外部传入的配置做范围校验，拒绝明显错误的组合。
//! - 可序列化，便于宿主侧读取 / 下发配置。

use serde::{Deserialize, Serialize};

use super::ImageError;

/// 重编码质量，固定值。
pub const ENCODE_QUALITY: u8 = 100;

/// 图片转换配置。
///
/// 字段覆盖了下载与解码两个阶段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载总超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址。
    pub allow_private_network: bool,
    /// 禁止内网访问时，是否对域名执行 DNS 解析后再做内网 IP 拦截。
    pub resolve_dns_for_url_safety: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: true,
            resolve_dns_for_url_safety: true,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
        }
    }
}

impl ImageConfig {
    /// 范围校验。
    ///
    /// # 示例
    /// ```rust
    /// use image_base64::image_handler::ImageConfig;
    ///
    /// let mut config = ImageConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.connect_timeout = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_file_size == 0 {
            return Err(ImageError::ResourceLimit("max_file_size 必须大于 0".to_string()));
        }
        if !(1..=600).contains(&self.download_timeout) {
            return Err(ImageError::ResourceLimit(
                "download_timeout 必须在 1~600 秒之间".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::ResourceLimit(
                "connect_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if self.connect_timeout > self.download_timeout {
            return Err(ImageError::ResourceLimit(
                "connect_timeout 不能大于 download_timeout".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(ImageError::ResourceLimit(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(ImageError::ResourceLimit(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_redirects > 20 {
            return Err(ImageError::ResourceLimit("max_redirects 不能超过 20".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(ImageError::ResourceLimit(
                "max_decoded_pixels 必须大于 0".to_string(),
            ));
        }
        if self.max_decoded_bytes < 4 * 1024 * 1024 {
            return Err(ImageError::ResourceLimit(
                "max_decoded_bytes 不能小于 4MB".to_string(),
            ));
        }

        Ok(())
    }
}
