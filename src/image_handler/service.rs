//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `ImageServiceState` 作为宿主侧持有的状态，替代全局单例函数。
//! 好处：
//! 1. 生命周期清晰（由宿主统一管理）
//! 2. 测试可创建独立实例，减少共享状态副作用
//! 3. 支持按请求 ID 协作式取消
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `get_base64_string`：执行完整转换链路
//! - `get_base64_string_cancellable` / `cancel_conversion`：带请求 ID 的可取消转换
//! - `set_config` / `config`：运行时配置

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{ConversionError, ConversionStage, ImageConfig, ImageError, ImageHandler};

/// 图片转换服务状态。
///
/// 内部持有 `ImageHandler` 与进行中请求的取消标志。
pub struct ImageServiceState {
    handler: ImageHandler,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl ImageServiceState {
    /// 使用默认配置创建服务状态。
    ///
    /// # 示例
    /// ```rust
    /// use image_base64::image_handler::ImageServiceState;
    ///
    /// let service = ImageServiceState::new()?;
    /// # Ok::<(), image_base64::image_handler::ImageError>(())
    /// ```
    pub fn new() -> Result<Self, ImageError> {
        Self::with_config(ImageConfig::default())
    }

    /// 使用自定义配置创建服务状态。
    ///
    /// # 示例
    /// ```rust
    /// use image_base64::image_handler::{ImageConfig, ImageServiceState};
    ///
    /// let mut config = ImageConfig::default();
    /// config.allow_private_network = false;
    /// let service = ImageServiceState::with_config(config)?;
    /// # Ok::<(), image_base64::image_handler::ImageError>(())
    /// ```
    pub fn with_config(config: ImageConfig) -> Result<Self, ImageError> {
        let handler = ImageHandler::new(config)?;
        Ok(Self {
            handler,
            cancel_flags: Mutex::new(HashMap::new()),
        })
    }

    /// 执行完整转换：加载 → 解码 → 重编码 → Base64。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_base64::image_handler::ImageServiceState;
    ///
    /// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    /// let service = ImageServiceState::new()?;
    /// let base64 = service.get_base64_string("/tmp/photo.jpg").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_base64_string(&self, uri: &str) -> Result<String, ConversionError> {
        self.handler.get_base64_string(uri).await
    }

    /// 带请求 ID 的转换，可通过 `cancel_conversion` 取消。
    ///
    /// 同一请求 ID 已在进行中时直接拒绝。
    pub async fn get_base64_string_cancellable(
        &self,
        request_id: String,
        uri: &str,
    ) -> Result<String, ConversionError> {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        {
            let mut guard = self.cancel_flags.lock().map_err(|_| {
                ConversionError::new(
                    ConversionStage::Fetching,
                    ImageError::Internal("取消标志锁已中毒".to_string()),
                )
            })?;
            if guard.contains_key(&request_id) {
                return Err(ConversionError::new(
                    ConversionStage::Fetching,
                    ImageError::ResourceLimit(format!("请求 ID 重复：{}", request_id)),
                ));
            }
            guard.insert(request_id.clone(), Arc::clone(&cancel_flag));
        }

        let result = self
            .handler
            .get_base64_string_with_hooks(
                uri,
                |downloaded, total| {
                    log::trace!("⏬ [{}] 已下载 {} / {:?} bytes", request_id, downloaded, total)
                },
                || cancel_flag.load(Ordering::SeqCst),
            )
            .await;

        if let Ok(mut guard) = self.cancel_flags.lock() {
            guard.remove(&request_id);
        }

        result
    }

    /// 标记请求为已取消；请求不存在时返回 `false`。
    pub fn cancel_conversion(&self, request_id: &str) -> Result<bool, ImageError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::Internal("取消标志锁已中毒".to_string()))?;

        if let Some(flag) = guard.get(request_id) {
            flag.store(true, Ordering::SeqCst);
            log::info!("🛑 已请求取消转换 - request_id: {}", request_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn set_config(&self, config: ImageConfig) -> Result<(), ImageError> {
        self.handler.set_config(config)
    }

    pub fn config(&self) -> Result<ImageConfig, ImageError> {
        self.handler.config_snapshot()
    }
}
