//! Web 服务器模块
//!
//! 基于 Axum 的宿主适配：所有请求进入同一个 fallback，收集请求体后在阻塞线程池上
//! 同步执行 [`Webi::dispatch`]，再把 [`WebiContext`] 转换回 HTTP 响应。

use crate::constants::{SERVER_ENABLE_REQUEST_LOGGING, SERVER_HOST, SERVER_MAX_BODY_SIZE, SERVER_PORT};
use crate::context::WebiContext;
use crate::middleware::{request_id, request_logging};
use crate::webi::Webi;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use webi_core::{ApplicationError, ApplicationResult, Environment};

/// 默认请求体上限：2 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Web 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 请求体大小上限（字节）
    pub max_body_size: usize,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string_or(SERVER_HOST, &defaults.host),
            port: u16::try_from(env.get_i64_or(SERVER_PORT, defaults.port as i64)).unwrap_or(defaults.port),
            max_body_size: usize::try_from(env.get_i64_or(SERVER_MAX_BODY_SIZE, defaults.max_body_size as i64))
                .unwrap_or(defaults.max_body_size),
            enable_request_logging: env.get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, defaults.enable_request_logging),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
struct ServerState {
    webi: Arc<Webi>,
    max_body_size: usize,
}

/// Webi HTTP 服务器
pub struct WebiServer {
    webi: Arc<Webi>,
    properties: ServerProperties,
}

impl WebiServer {
    pub fn new(webi: Arc<Webi>, properties: ServerProperties) -> Self {
        Self { webi, properties }
    }

    pub fn from_environment(webi: Arc<Webi>, env: &Environment) -> Self {
        Self::new(webi, ServerProperties::from_environment(env))
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// 构建 axum 路由
    pub fn router(&self) -> Router {
        let state = ServerState {
            webi: Arc::clone(&self.webi),
            max_body_size: self.properties.max_body_size,
        };

        let mut router = Router::new().fallback(dispatch).with_state(state);
        if self.properties.enable_request_logging {
            router = router
                .layer(axum::middleware::from_fn(request_logging))
                .layer(TraceLayer::new_for_http());
        }
        router.layer(axum::middleware::from_fn(request_id))
    }

    /// 启动服务器
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.properties.address();
        let app = self.router().into_make_service();

        tracing::info!("🚀 Starting Webi server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Other(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("✅ Server listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ApplicationError::Other(format!("Server error: {}", e)))?;

        Ok(())
    }
}

async fn dispatch(State(state): State<ServerState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "Rejected request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let ctx = WebiContext::from_parts(parts.method, &parts.uri, parts.headers, body);
    let webi = Arc::clone(&state.webi);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut ctx = ctx;
        webi.dispatch(&mut ctx);
        ctx.into_response_parts()
    })
    .await;

    match outcome {
        Ok((status, headers, body)) => (status, headers, body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Request dispatch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
