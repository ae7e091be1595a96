//! Base64 输出阶段：标准字母表、带填充、不换行、非 URL-safe。

use base64::{Engine as _, engine::general_purpose};

use super::ImageError;

/// 将重编码后的字节转为 Base64 文本。
///
/// 输入为空说明上游阶段出现了不该出现的状态，按编码错误返回。
///
/// # 示例
/// ```rust
/// use image_base64::image_handler::to_base64;
///
/// assert_eq!(to_base64(b"hi?")?, "aGk/");
/// # Ok::<(), image_base64::image_handler::ImageError>(())
/// ```
pub fn to_base64(encoded: &[u8]) -> Result<String, ImageError> {
    if encoded.is_empty() {
        return Err(ImageError::Encode("待编码内容为空".to_string()));
    }

    Ok(general_purpose::STANDARD.encode(encoded))
}
