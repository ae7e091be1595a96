//! # 图片转 Base64 模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“URI 分类 → 加载校验 → 解码 → 重编码 → Base64 → 宿主桥接”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `bridge`：仅做宿主侧入参/出参适配（薄封装）
//! - `service`：承载可持有状态（`ImageServiceState`）与按请求取消
//! - `handler`：编排整条处理流水线 + 阶段状态
//! - `loader`：负责 URL/文件加载与安全校验
//! - `pipeline`：负责签名校验、像素限制、解码与重编码
//! - `encoder`：负责 Base64 输出
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! 宿主调用
//!    ↓
//! bridge.rs（参数适配 + BridgeError）
//!    ↓
//! service.rs（状态持有、请求 ID 取消）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ loader.rs（Fetching：URL / 文件 → 原始字节 + 类型提示）
//!    ├─ pipeline.rs（Decoding / Reencoding：RGBA8 → PNG/JPEG/WEBP）
//!    └─ encoder.rs（Encoding：Base64）
//!    ↓
//! 返回 Base64 文本或 ConversionError
//! ```

pub mod bridge;
mod config;
mod encoder;
mod error;
mod handler;
mod loader;
mod pipeline;
mod service;
mod source;

pub use config::{ENCODE_QUALITY, ImageConfig};
pub use encoder::to_base64;
pub use error::{ConversionError, ConversionStage, ImageError};
pub use handler::ImageHandler;
pub use service::ImageServiceState;
pub use source::{ImageSource, ImageType};
