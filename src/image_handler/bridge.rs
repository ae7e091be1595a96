//! # 宿主桥接层
//!
//! ## 设计思路
//!
//! 桥接层仅做参数接收与结果返回，不承载业务逻辑。
//! 所有实际处理交由 `ImageServiceState`；错误统一转成可序列化的 `BridgeError`，
//! 宿主（IPC / CLI / 原生模块）拿到的是稳定的 `{code, stage, message}` 结构。

use super::{ConversionError, ImageConfig, ImageError, ImageServiceState};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BridgeError {
    pub code: &'static str,
    pub stage: Option<&'static str>,
    pub message: String,
}

impl From<ConversionError> for BridgeError {
    fn from(error: ConversionError) -> Self {
        Self {
            code: error.code(),
            stage: Some(error.stage.as_str()),
            message: error.source.to_string(),
        }
    }
}

impl From<ImageError> for BridgeError {
    fn from(error: ImageError) -> Self {
        Self {
            code: error.code(),
            stage: None,
            message: error.to_string(),
        }
    }
}

/// 获取图片的 Base64 编码（不带 `data:` 前缀）。
pub async fn get_base64_string(
    state: &ImageServiceState,
    uri: String,
) -> Result<String, BridgeError> {
    let base64 = state.get_base64_string(&uri).await?;
    Ok(base64)
}

/// 带请求 ID 的版本，配合 `cancel_conversion` 使用。
pub async fn get_base64_string_cancellable(
    state: &ImageServiceState,
    uri: String,
    request_id: String,
) -> Result<String, BridgeError> {
    let base64 = state.get_base64_string_cancellable(request_id, &uri).await?;
    Ok(base64)
}

pub fn cancel_conversion(state: &ImageServiceState, request_id: String) -> Result<bool, BridgeError> {
    Ok(state.cancel_conversion(&request_id)?)
}

/// 查询当前生效配置。
pub fn get_image_config(state: &ImageServiceState) -> Result<ImageConfig, BridgeError> {
    Ok(state.config()?)
}

pub fn set_image_config(state: &ImageServiceState, config: ImageConfig) -> Result<(), BridgeError> {
    state.set_config(config)?;
    Ok(())
}
