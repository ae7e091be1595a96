//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageHandler` 只负责流程编排与配置管理，不与任何宿主框架绑定。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 解析 URI 并加载原始字节（Fetching）
//! 3. 解码为 RGBA8 像素（Decoding）
//! 4. 按归一化类型以质量 100 重编码（Reencoding）
//! 5. 转为 Base64 文本（Encoding）
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时替换，单次请求内使用同一快照。
//! - 输出类型 `ImageType` 是单次调用内的局部值，并发调用互不影响。
//! - `StageTracker` 维护 `Idle → … → Done / Failed` 状态，任何失败都带上阶段返回，
//!   绝不返回空串或半成品。
//! - 解码与重编码是 CPU 密集任务，放到 blocking 线程池执行。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::encoder::to_base64;
use super::{ConversionError, ConversionStage, ImageConfig, ImageError, ImageSource, ImageType};

/// 单次转换的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConversionState {
    Idle,
    Running(ConversionStage),
    Done,
    Failed(ConversionStage),
}

/// 状态推进 + 阶段耗时记录。
pub(crate) struct StageTracker {
    state: ConversionState,
    stage_start: Instant,
    timings: Vec<(ConversionStage, Duration)>,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: ConversionState::Idle,
            stage_start: Instant::now(),
            timings: Vec::with_capacity(4),
        }
    }

    pub(crate) fn state(&self) -> ConversionState {
        self.state
    }

    pub(crate) fn enter(&mut self, stage: ConversionStage) {
        self.close_running_stage();
        log::debug!("➡️ 进入阶段：{}", stage);
        self.state = ConversionState::Running(stage);
    }

    /// 标记失败并包装为 `ConversionError`。
    ///
    /// 尚未进入任何阶段时归到 Fetching。
    pub(crate) fn fail(&mut self, source: ImageError) -> ConversionError {
        let stage = match self.state {
            ConversionState::Running(stage) | ConversionState::Failed(stage) => stage,
            ConversionState::Idle | ConversionState::Done => ConversionStage::Fetching,
        };
        self.state = ConversionState::Failed(stage);

        log::error!("❌ 图片转换失败 - 阶段: {} 原因: {}", stage, source);
        ConversionError::new(stage, source)
    }

    pub(crate) fn finish(&mut self) -> &[(ConversionStage, Duration)] {
        self.close_running_stage();
        self.state = ConversionState::Done;
        &self.timings
    }

    fn close_running_stage(&mut self) {
        if let ConversionState::Running(current) = self.state {
            self.timings.push((current, self.stage_start.elapsed()));
        }
        self.stage_start = Instant::now();
    }
}

/// 图片转 Base64 处理器。
///
/// 封装了配置状态，并编排各子模块实现完整流程。
pub struct ImageHandler {
    pub(super) config: Arc<RwLock<ImageConfig>>,
}

impl Default for ImageHandler {
    fn default() -> Self {
        Self {
            config: Arc::new(RwLock::new(ImageConfig::default())),
        }
    }
}

impl ImageHandler {
    /// 根据初始配置创建处理器，配置不合法时返回错误。
    ///
    /// # 示例
    /// ```rust
    /// use image_base64::image_handler::{ImageConfig, ImageHandler};
    ///
    /// let handler = ImageHandler::new(ImageConfig::default())?;
    /// # Ok::<(), image_base64::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Result<Self, ImageError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::Internal("配置读取锁已中毒".to_string()))
    }

    /// 整体替换配置，对之后开始的请求生效。
    pub fn set_config(&self, config: ImageConfig) -> Result<(), ImageError> {
        config.validate()?;

        let mut guard = self
            .config
            .write()
            .map_err(|_| ImageError::Internal("配置写入锁已中毒".to_string()))?;
        *guard = config;

        log::info!(
            "⚙️ 已更新图片配置（max_file_size={}, download_timeout={}s, max_redirects={}, allow_private_network={}）",
            guard.max_file_size,
            guard.download_timeout,
            guard.max_redirects,
            guard.allow_private_network
        );

        Ok(())
    }

    /// 处理主入口：URI → Base64 文本（不带 `data:` 前缀）。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_base64::image_handler::ImageHandler;
    ///
    /// # async fn demo() -> Result<(), image_base64::image_handler::ConversionError> {
    /// let handler = ImageHandler::default();
    /// let base64 = handler.get_base64_string("https://example.com/a.png").await?;
    /// println!("{}", base64);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_base64_string(&self, uri: &str) -> Result<String, ConversionError> {
        self.get_base64_string_with_hooks(uri, |_, _| {}, || false)
            .await
    }

    /// 带下载进度回调与协作式取消检查的处理入口。
    pub async fn get_base64_string_with_hooks<P, C>(
        &self,
        uri: &str,
        on_progress: P,
        is_cancelled: C,
    ) -> Result<String, ConversionError>
    where
        P: Fn(u64, Option<u64>) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        let mut tracker = StageTracker::new();
        let total_start = Instant::now();

        tracker.enter(ConversionStage::Fetching);
        let config = self.config_snapshot().map_err(|e| tracker.fail(e))?;
        let source = ImageSource::resolve(uri).map_err(|e| tracker.fail(e))?;
        log::info!("🚀 开始转换 - 来源类型: {}", source.kind());

        let raw = self
            .load_from_source(&source, &config, &on_progress, &is_cancelled)
            .await
            .map_err(|e| tracker.fail(e))?;
        Self::ensure_not_cancelled(&is_cancelled).map_err(|e| tracker.fail(e))?;

        tracker.enter(ConversionStage::Decoding);
        let target = ImageType::normalize(raw.type_hint.as_deref());
        let pixels = Self::run_blocking(ImageError::Decode, move || {
            Self::decode_to_pixels(&raw, &config)
        })
        .await
        .map_err(|e| tracker.fail(e))?;
        Self::ensure_not_cancelled(&is_cancelled).map_err(|e| tracker.fail(e))?;

        tracker.enter(ConversionStage::Reencoding);
        let encoded = Self::run_blocking(ImageError::Encode, move || {
            Self::reencode(&pixels, target)
        })
        .await
        .map_err(|e| tracker.fail(e))?;
        Self::ensure_not_cancelled(&is_cancelled).map_err(|e| tracker.fail(e))?;

        tracker.enter(ConversionStage::Encoding);
        let base64 = to_base64(&encoded).map_err(|e| tracker.fail(e))?;

        let timings = tracker
            .finish()
            .iter()
            .map(|(stage, elapsed)| format!("{}={}ms", stage, elapsed.as_millis()))
            .collect::<Vec<_>>()
            .join(" ");
        log::debug!("🏁 转换状态：{:?}", tracker.state());
        log::info!(
            "✅ 图片转换完成 - 输出格式: {} {} total={}ms",
            target,
            timings,
            total_start.elapsed().as_millis()
        );

        Ok(base64)
    }

    fn ensure_not_cancelled<C>(is_cancelled: &C) -> Result<(), ImageError>
    where
        C: Fn() -> bool,
    {
        if is_cancelled() {
            return Err(ImageError::Cancelled("图片转换已取消".to_string()));
        }
        Ok(())
    }

    /// 在 blocking 线程池执行 CPU 密集任务；任务异常退出时用 `on_abort` 映射错误。
    async fn run_blocking<T, F>(on_abort: fn(String) -> ImageError, task: F) -> Result<T, ImageError>
    where
        F: FnOnce() -> Result<T, ImageError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| on_abort(format!("后台任务异常退出：{}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn write_fixture(dir: &tempfile::TempDir, name: &str, format: ImageFormat) -> String {
        let img = ImageBuffer::from_fn(24, 18, |x, y| {
            Rgba([(x * 10) as u8, (y * 12) as u8, ((x + y) * 3) as u8, 255])
        });
        let dyn_img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).into_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut cursor = Cursor::new(Vec::new());
        dyn_img.write_to(&mut cursor, format).expect("encode fixture");

        let path = dir.path().join(name);
        std::fs::write(&path, cursor.into_inner()).expect("write fixture");
        path.to_string_lossy().into_owned()
    }

    fn decode_output(base64: &str) -> Vec<u8> {
        general_purpose::STANDARD.decode(base64).expect("output is valid base64")
    }

    #[test]
    fn tracker_walks_states_and_records_timings() {
        let mut tracker = StageTracker::new();
        assert_eq!(tracker.state(), ConversionState::Idle);

        tracker.enter(ConversionStage::Fetching);
        tracker.enter(ConversionStage::Decoding);
        assert_eq!(tracker.state(), ConversionState::Running(ConversionStage::Decoding));

        tracker.enter(ConversionStage::Reencoding);
        tracker.enter(ConversionStage::Encoding);
        let timings = tracker.finish().to_vec();

        assert_eq!(tracker.state(), ConversionState::Done);
        assert_eq!(
            timings.iter().map(|(stage, _)| *stage).collect::<Vec<_>>(),
            vec![
                ConversionStage::Fetching,
                ConversionStage::Decoding,
                ConversionStage::Reencoding,
                ConversionStage::Encoding,
            ]
        );
    }

    #[test]
    fn tracker_failure_keeps_current_stage() {
        let mut tracker = StageTracker::new();
        tracker.enter(ConversionStage::Reencoding);

        let err = tracker.fail(ImageError::Encode("boom".to_string()));

        assert_eq!(err.stage, ConversionStage::Reencoding);
        assert_eq!(tracker.state(), ConversionState::Failed(ConversionStage::Reencoding));
    }

    #[tokio::test]
    async fn local_sources_keep_their_format_family() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handler = ImageHandler::default();

        for (name, format) in [
            ("a.png", ImageFormat::Png),
            ("b.jpg", ImageFormat::Jpeg),
            ("c.webp", ImageFormat::WebP),
        ] {
            let path = write_fixture(&dir, name, format);
            let base64 = handler.get_base64_string(&path).await.expect("conversion succeeds");
            let bytes = decode_output(&base64);

            assert_eq!(image::guess_format(&bytes).expect("guess"), format);
            let decoded = image::load_from_memory(&bytes).expect("output decodes");
            assert_eq!((decoded.width(), decoded.height()), (24, 18));
        }
    }

    #[tokio::test]
    async fn unsupported_local_type_is_coerced_to_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "d.bmp", ImageFormat::Bmp);

        let base64 = ImageHandler::default()
            .get_base64_string(&path)
            .await
            .expect("conversion succeeds");

        assert_eq!(
            image::guess_format(&decode_output(&base64)).expect("guess"),
            ImageFormat::Png
        );
    }

    #[tokio::test]
    async fn non_image_file_fails_at_decoding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "definitely not pixels").expect("write fixture");

        let err = ImageHandler::default()
            .get_base64_string(&path.to_string_lossy())
            .await
            .expect_err("text file must not convert");

        assert_eq!(err.stage, ConversionStage::Decoding);
        assert!(matches!(err.source, ImageError::Decode(_)));
    }

    #[tokio::test]
    async fn empty_file_fails_at_decoding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").expect("write fixture");

        let err = ImageHandler::default()
            .get_base64_string(&path.to_string_lossy())
            .await
            .expect_err("empty file must not convert");

        assert!(matches!(err.source, ImageError::Decode(_)));
    }

    #[tokio::test]
    async fn missing_file_fails_at_fetching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.png");

        let err = ImageHandler::default()
            .get_base64_string(&path.to_string_lossy())
            .await
            .expect_err("missing file must not convert");

        assert_eq!(err.stage, ConversionStage::Fetching);
        assert!(matches!(err.source, ImageError::FileAccess(_)));
    }

    #[tokio::test]
    async fn empty_uri_is_resolution_error() {
        let err = ImageHandler::default()
            .get_base64_string("")
            .await
            .expect_err("empty uri must not convert");

        assert!(matches!(err.source, ImageError::UriResolution(_)));
    }

    #[tokio::test]
    async fn repeated_conversion_is_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "same.jpg", ImageFormat::Jpeg);
        let handler = ImageHandler::default();

        let first = handler.get_base64_string(&path).await.expect("first");
        let second = handler.get_base64_string(&path).await.expect("second");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cancellation_is_reported_as_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "cancel.png", ImageFormat::Png);
        let cancelled = AtomicBool::new(true);

        let err = ImageHandler::default()
            .get_base64_string_with_hooks(&path, |_, _| {}, || cancelled.load(Ordering::SeqCst))
            .await
            .expect_err("cancelled conversion must fail");

        assert!(matches!(err.source, ImageError::Cancelled(_)));
    }

    #[tokio::test]
    async fn cancellation_after_reencoding_skips_base64() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "late-cancel.png", ImageFormat::Png);
        let checks = AtomicUsize::new(0);

        // 第 3 次检查发生在重编码之后
        let err = ImageHandler::default()
            .get_base64_string_with_hooks(&path, |_, _| {}, || {
                checks.fetch_add(1, Ordering::SeqCst) + 1 >= 3
            })
            .await
            .expect_err("cancelled conversion must fail");

        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert_eq!(err.stage, ConversionStage::Reencoding);
        assert!(matches!(err.source, ImageError::Cancelled(_)));
    }

    #[tokio::test]
    async fn local_path_with_surrounding_whitespace_converts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_fixture(&dir, "pic.png ", ImageFormat::Png);

        let base64 = ImageHandler::default()
            .get_base64_string(&path)
            .await
            .expect("file name with trailing space converts");

        assert_eq!(
            image::guess_format(&decode_output(&base64)).expect("guess"),
            ImageFormat::Png
        );
    }

    #[test]
    fn poisoned_config_lock_is_internal_error() {
        let handler = ImageHandler::default();

        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = handler.config.write().expect("write lock");
                    panic!("poison config lock");
                })
                .join()
        });

        let err = handler.config_snapshot().expect_err("poisoned lock");
        assert_eq!(err.code(), "E_INTERNAL");
        assert!(matches!(
            handler.set_config(ImageConfig::default()),
            Err(ImageError::Internal(_))
        ));
    }

    #[test]
    fn set_config_rejects_invalid_values() {
        let handler = ImageHandler::default();
        let mut config = ImageConfig::default();
        config.connect_timeout = 0;

        assert!(handler.set_config(config).is_err());
        assert_eq!(
            handler.config_snapshot().expect("snapshot"),
            ImageConfig::default()
        );
    }
}
