//! # 加载模块（Fetcher）
//!
//! ## 设计思路
//!
//! 统一处理远程 URL / 本地文件两种来源的原始字节加载，并给出类型提示。
//! 校验尽量前置：URL 安全、Content-Length、文件 metadata 体积都在读取正文前检查。
//!
//! ## 实现思路
//!
//! - URL：协议 + 主机安全 + 手动跟随重定向 + 流式下载（首包/分块超时 + 体积上限）。
//!   类型提示取自 `content-type` 响应头。
//! - 文件：只读打开 → metadata 体积校验 → 读取全部内容，文件句柄随作用域释放。
//!   类型提示取自图片自身签名，而不是扩展名。
//! - 不做自动重试，失败立即返回。

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::lookup_host;

use super::source::RawImageData;
use super::{ImageConfig, ImageError, ImageHandler, ImageSource};

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

impl ImageHandler {
    /// 按来源加载原始字节。
    pub(super) async fn load_from_source<P, C>(
        &self,
        source: &ImageSource,
        config: &ImageConfig,
        on_progress: &P,
        is_cancelled: &C,
    ) -> Result<RawImageData, ImageError>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        match source {
            ImageSource::Remote(url) => {
                self.load_from_url_with_hooks(url.as_str(), config, on_progress, is_cancelled)
                    .await
            }
            ImageSource::Local(path) => self.load_from_file(path, config).await,
        }
    }

    /// 从 URL 加载图片原始字节。
    #[cfg(test)]
    pub(super) async fn load_from_url(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        self.load_from_url_with_hooks(url, config, &|_: u64, _: Option<u64>| {}, &|| false)
            .await
    }

    pub(super) async fn load_from_url_with_hooks<P, C>(
        &self,
        url: &str,
        config: &ImageConfig,
        on_progress: &P,
        is_cancelled: &C,
    ) -> Result<RawImageData, ImageError>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        let (bytes, content_type) = self
            .download_with_validation_with_hooks(url, config, on_progress, is_cancelled)
            .await?;

        Ok(RawImageData {
            bytes,
            type_hint: content_type,
            source_hint: "url",
        })
    }

    /// 从本地路径加载图片原始字节。
    pub(super) async fn load_from_file(
        &self,
        path: &Path,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        let file = tokio::fs::File::open(path).await.map_err(|e| {
            ImageError::FileAccess(format!("无法打开文件 {}：{}", path.display(), e))
        })?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| ImageError::FileAccess(format!("无法读取文件信息：{}", e)))?;

        if !metadata.is_file() {
            return Err(ImageError::FileAccess(format!(
                "不是普通文件：{}",
                path.display()
            )));
        }

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let capacity = metadata.len().min(config.max_file_size) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        file.take(config.max_file_size.saturating_add(1))
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ImageError::FileAccess(format!("无法读取图片文件：{}", e)))?;

        // 读取期间文件被追加写入
        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit("读取后文件超过大小限制".to_string()));
        }

        let type_hint = Self::sniff_embedded_mime(&bytes);
        log::debug!(
            "✅ 读取完成 - {} bytes, 签名类型: {}",
            bytes.len(),
            type_hint.as_deref().unwrap_or("未知")
        );

        Ok(RawImageData {
            bytes,
            type_hint,
            source_hint: "file",
        })
    }

    /// 从图片字节自身的签名推断 MIME。
    fn sniff_embedded_mime(bytes: &[u8]) -> Option<String> {
        image::guess_format(bytes)
            .ok()
            .map(|format| format.to_mime_type().to_string())
    }

    /// 执行带校验的网络下载，返回正文与 `content-type`。
    #[cfg(test)]
    pub(super) async fn download_with_validation(
        &self,
        url: &str,
        config: &ImageConfig,
    ) -> Result<(Vec<u8>, Option<String>), ImageError> {
        self.download_with_validation_with_hooks(url, config, &|_: u64, _: Option<u64>| {}, &|| false)
            .await
    }

    /// 起点与每一跳都先经过 `validate_url_safety`，再用绑定了校验结果的客户端发请求。
    pub(super) async fn download_with_validation_with_hooks<P, C>(
        &self,
        url: &str,
        config: &ImageConfig,
        on_progress: &P,
        is_cancelled: &C,
    ) -> Result<(Vec<u8>, Option<String>), ImageError>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| ImageError::UriResolution(format!("URL 格式错误：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            if is_cancelled() {
                return Err(ImageError::Cancelled("图片下载已取消".to_string()));
            }

            let pinned = Self::validate_url_safety(current_url.as_str(), config).await?;
            let client = Self::build_http_client(config, current_url.host_str(), &pinned)?;

            log::debug!("📡 发送 HTTP 请求: {}", Self::redact_url_for_log(current_url.as_str()));
            let response = client
                .get(current_url.clone())
                .header(reqwest::header::ACCEPT, "image/webp,image/png,image/jpeg,image/*,*/*;q=0.8")
                .send()
                .await
                .map_err(|e| Self::map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(ImageError::Fetch(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| ImageError::Fetch("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| ImageError::Fetch(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| ImageError::Fetch(format!("重定向 URL 解析失败：{}", e)))?;

                log::debug!("↪️ 跳转到: {}", Self::redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(ImageError::Fetch(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .map(|ct| ct.trim().to_string())
                .filter(|ct| !ct.is_empty());

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(ImageError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            on_progress(0, total_len);

            let buffer = Self::read_body_with_limits(
                response,
                config,
                total_len,
                on_progress,
                is_cancelled,
            )
            .await?;

            log::debug!(
                "✅ 下载完成 - {} bytes, content-type: {}",
                buffer.len(),
                content_type.as_deref().unwrap_or("<无>")
            );

            return Ok((buffer, content_type));
        }

        Err(ImageError::Fetch("下载流程异常结束".to_string()))
    }

    /// 分块读取响应正文：首包/分块超时 + 体积上限 + 取消检查。
    async fn read_body_with_limits<P, C>(
        mut response: reqwest::Response,
        config: &ImageConfig,
        total_len: Option<u64>,
        on_progress: &P,
        is_cancelled: &C,
    ) -> Result<Vec<u8>, ImageError>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Fetch("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Fetch("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| ImageError::Fetch(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            if is_cancelled() {
                return Err(ImageError::Cancelled("图片下载已取消".to_string()));
            }

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            on_progress(total, total_len);
        }

        on_progress(total, total_len.or(Some(total)));
        Ok(buffer)
    }

    /// 构建不自动跳转的客户端；`pinned` 非空时把主机绑定到已校验的地址，
    /// 连接阶段不再重新解析 DNS。
    fn build_http_client(
        config: &ImageConfig,
        host: Option<&str>,
        pinned: &[SocketAddr],
    ) -> Result<reqwest::Client, ImageError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none());

        if let Some(host) = host.filter(|_| !pinned.is_empty()) {
            builder = builder.resolve_to_addrs(host, pinned);
        }

        builder
            .build()
            .map_err(|e| ImageError::Fetch(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 校验 URL 安全性，返回需要绑定的公网地址（未做 DNS 校验时为空）。
    ///
    /// 关闭 `allow_private_network` 时阻止本地/内网目标。
    pub(super) async fn validate_url_safety(
        url: &str,
        config: &ImageConfig,
    ) -> Result<Vec<SocketAddr>, ImageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::UriResolution(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::UriResolution("仅支持 HTTP/HTTPS".to_string()));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ImageError::UriResolution("URL 缺少主机地址".to_string()))?;

        if config.allow_private_network {
            return Ok(Vec::new());
        }

        if Self::is_local_hostname(host) {
            return Err(ImageError::UriResolution(format!(
                "禁止访问本地网络地址：{}",
                host
            )));
        }

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(ImageError::UriResolution(format!("禁止访问内网 IP：{}", ip)));
            }

            return Ok(Vec::new());
        }

        if !config.resolve_dns_for_url_safety {
            return Ok(Vec::new());
        }

        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ImageError::UriResolution("URL 缺少端口信息".to_string()))?;

        let pinned = Self::resolve_public_socket_addrs(host, port).await?;
        if pinned.is_empty() {
            return Err(ImageError::UriResolution("URL 未解析到有效地址".to_string()));
        }

        Ok(pinned)
    }

    async fn resolve_public_socket_addrs(
        host: &str,
        port: u16,
    ) -> Result<Vec<SocketAddr>, ImageError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| ImageError::UriResolution(format!("URL 主机解析失败：{}", e)))?;

        let mut result = Vec::new();
        for addr in addrs {
            if Self::is_private_or_local_ip(addr.ip()) {
                return Err(ImageError::UriResolution(format!(
                    "URL 解析结果命中内网地址：{}",
                    addr.ip()
                )));
            }

            result.push(addr);
        }

        Ok(result)
    }

    /// 判断主机名是否指向本地地址。
    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("localhost.")
            || host.ends_with(".local")
    }

    /// 判断 IP 是否属于本地/内网/链路本地等受限范围。
    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                // 0.0.0.0/8 与 CGNAT 100.64.0.0/10
                let octets = v4.octets();
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                // ::ffff:a.b.c.d 按内嵌的 IPv4 判断
                if let Some(v4) = v6.to_ipv4_mapped() {
                    return Self::is_private_or_local_ip(IpAddr::V4(v4));
                }

                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    pub(super) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = parsed.path();

        format!("{}://{}{}{}", parsed.scheme(), host, port, path)
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &ImageConfig) -> ImageError {
        let err_msg = Self::sanitize_error_message_with_redacted_url(&e.to_string(), url);

        if e.is_timeout() {
            ImageError::Fetch(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            ImageError::Fetch(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Fetch(format!("请求失败：{}", err_msg))
        }
    }

    fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
        let redacted = Self::redact_url_for_log(url);
        error_msg.replace(url, &redacted)
    }

    /// 常见 HTTP 状态码文案。
    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            401 => "未授权",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }
}
