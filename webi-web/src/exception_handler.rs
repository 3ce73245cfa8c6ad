//! 异常处理
//!
//! 请求处理中出现的错误统一为 [`WebError`]。REST 处理器把错误交给
//! [`ExceptionHandlerRegistry`]，按优先级找到第一个能处理的 [`ExceptionHandler`]，
//! 都不能处理时使用默认处理：记录日志，状态码设置为错误码，返回
//! `{"error": true, "msg": ..., "code": ...}`。

use crate::codec::CodecError;
use crate::context::WebiContext;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use webi_core::BeanError;

/// Web 层错误类型
#[derive(Error, Debug)]
pub enum WebError {
    /// 没有匹配的路由或操作 - 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 参数缺失或非法 - 400
    #[error("Bad request - {0}")]
    Client(String),

    /// 携带任意状态码的错误
    #[error("{message}")]
    Http { code: u16, message: String },

    /// 内部错误 - 500
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Bean(#[from] BeanError),
}

impl WebError {
    pub fn not_found(what: impl Into<String>) -> Self {
        WebError::NotFound(what.into())
    }

    pub fn client(message: impl Into<String>) -> Self {
        WebError::Client(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        WebError::Internal(message.into())
    }

    pub fn http(code: u16, message: impl Into<String>) -> Self {
        WebError::Http {
            code,
            message: message.into(),
        }
    }

    /// 错误码，0 表示未指定
    pub fn code(&self) -> u16 {
        match self {
            WebError::NotFound(_) => 404,
            WebError::Client(_) => 400,
            WebError::Http { code, .. } => *code,
            WebError::Internal(_) | WebError::Codec(_) | WebError::Bean(_) => 500,
        }
    }

    /// 对应的 HTTP 状态码，未指定或非法时为 500
    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            0 => StatusCode::INTERNAL_SERVER_ERROR,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WebError>() {
            Ok(web) => web,
            Err(other) => WebError::Internal(format!("{:#}", other)),
        }
    }
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorMessage {
    pub error: bool,
    pub msg: String,
    pub code: u16,
}

impl ErrorMessage {
    pub fn new(msg: impl Into<String>, code: u16) -> Self {
        Self {
            error: true,
            msg: msg.into(),
            code,
        }
    }
}

impl From<&WebError> for ErrorMessage {
    fn from(err: &WebError) -> Self {
        ErrorMessage::new(err.to_string(), err.code())
    }
}

/// 自定义异常处理器
///
/// # 示例
///
/// ```
/// use serde_json::{json, Value};
/// use webi_web::prelude::*;
///
/// struct TeapotHandler;
///
/// impl ExceptionHandler for TeapotHandler {
///     fn name(&self) -> &str {
///         "teapot"
///     }
///
///     fn can_handle(&self, error: &WebError) -> bool {
///         error.code() == 418
///     }
///
///     fn handle(&self, ctx: &mut WebiContext, _error: &WebError) -> Option<Value> {
///         ctx.set_status(418);
///         Some(json!({ "tea": true }))
///     }
/// }
/// ```
pub trait ExceptionHandler: Send + Sync {
    fn name(&self) -> &str;

    /// 优先级，数字越小越先执行
    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, error: &WebError) -> bool;

    /// 返回要序列化的响应体；返回 None 时交给下一个处理器
    fn handle(&self, ctx: &mut WebiContext, error: &WebError) -> Option<Value>;
}

/// 异常处理器注册表
#[derive(Default)]
pub struct ExceptionHandlerRegistry {
    handlers: Vec<Arc<dyn ExceptionHandler>>,
}

impl ExceptionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ExceptionHandler>) {
        tracing::debug!(handler = handler.name(), priority = handler.priority(), "Exception handler registered");
        self.handlers.push(handler);
        self.handlers.sort_by_key(|handler| handler.priority());
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 把错误转换为响应体，并设置响应状态码
    pub fn handle_error(&self, ctx: &mut WebiContext, error: &WebError) -> Value {
        for handler in self.handlers.iter().filter(|handler| handler.can_handle(error)) {
            if let Some(body) = handler.handle(ctx, error) {
                tracing::debug!(handler = handler.name(), error = %error, "Error handled by custom handler");
                return body;
            }
        }
        Self::default_response(ctx, error)
    }

    fn default_response(ctx: &mut WebiContext, error: &WebError) -> Value {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(path = ctx.request_path(), error = %error, "Request failed");
        } else {
            tracing::warn!(path = ctx.request_path(), status = status.as_u16(), error = %error, "Request rejected");
        }

        ctx.set_status(status.as_u16());
        let message = ErrorMessage::from(error);
        serde_json::to_value(&message).unwrap_or(Value::Null)
    }
}
