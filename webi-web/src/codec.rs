//! 编解码器
//!
//! 序列化交给 serde_json，编解码器只负责 `serde_json::Value` 与字节之间的转换，
//! 按格式名（`format` 查询参数）或 MIME 类型（请求的 Content-Type）查找。

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode {format} response: {message}")]
    Encode { format: String, message: String },

    #[error("Failed to decode {format} body: {message}")]
    Decode { format: String, message: String },
}

/// 一种传输格式
pub trait Codec: Send + Sync {
    /// 格式名，例如 `json`
    fn format(&self) -> &str;

    fn mime_type(&self) -> &str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> &str {
        "json"
    }

    fn mime_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            format: self.format().to_string(),
            message: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            format: self.format().to_string(),
            message: e.to_string(),
        })
    }
}

/// 纯文本：字符串原样输出，其他值输出 JSON 文本
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn format(&self) -> &str {
        "text"
    }

    fn mime_type(&self) -> &str {
        "text/plain; charset=utf-8"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        match value {
            Value::String(text) => Ok(text.clone().into_bytes()),
            Value::Null => Ok(Vec::new()),
            other => Ok(other.to_string().into_bytes()),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|e| CodecError::Decode {
                format: self.format().to_string(),
                message: e.to_string(),
            })
    }
}

/// 编解码器注册表
#[derive(Clone)]
pub struct Codecs {
    codecs: Vec<Arc<dyn Codec>>,
    default_format: String,
}

impl Codecs {
    /// 只包含 JSON 和文本，默认 JSON
    pub fn new() -> Self {
        Self {
            codecs: vec![Arc::new(JsonCodec), Arc::new(TextCodec)],
            default_format: "json".to_string(),
        }
    }

    /// 设置默认格式，未注册的格式被忽略
    pub fn with_default_format(mut self, format: &str) -> Self {
        if self.by_format(format).is_some() {
            self.default_format = format.to_lowercase();
        } else {
            tracing::warn!(format = format, "Unknown default format, keeping {}", self.default_format);
        }
        self
    }

    /// 注册编解码器，同名格式会被替换
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs
            .retain(|existing| !existing.format().eq_ignore_ascii_case(codec.format()));
        self.codecs.push(codec);
    }

    pub fn default_format(&self) -> &str {
        &self.default_format
    }

    pub fn by_format(&self, format: &str) -> Option<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .find(|codec| codec.format().eq_ignore_ascii_case(format.trim()))
            .cloned()
    }

    /// 按 MIME 类型查找，忽略参数部分
    pub fn by_mime_type(&self, mime: &str) -> Option<Arc<dyn Codec>> {
        let wanted = essence(mime);
        self.codecs
            .iter()
            .find(|codec| essence(codec.mime_type()).eq_ignore_ascii_case(wanted))
            .cloned()
    }

    /// 默认编解码器
    pub fn default_codec(&self) -> Arc<dyn Codec> {
        match self.by_format(&self.default_format) {
            Some(codec) => codec,
            None => Arc::new(JsonCodec),
        }
    }

    /// 请求的格式，未指定或未知时返回默认编解码器
    pub fn negotiate(&self, format: Option<&str>) -> Arc<dyn Codec> {
        match format {
            Some(format) => self.by_format(format).unwrap_or_else(|| {
                tracing::debug!(format = format, "Unknown format requested, using default");
                self.default_codec()
            }),
            None => self.default_codec(),
        }
    }
}

impl Default for Codecs {
    fn default() -> Self {
        Self::new()
    }
}

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or("").trim()
}
