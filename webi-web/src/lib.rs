//! # Webi Web
//!
//! 可嵌入的 HTTP 应用服务器
//!
//! ## 核心特性
//!
//! - **前缀路由** - 每个路径由最长前缀的处理器处理，过滤器按注册顺序叠加
//! - **REST 控制器** - 注册时声明操作和参数，请求数据自动绑定
//! - **依赖注入** - 控制器由 Webi Core 的 BeanContext 装配，支持请求级会话
//! - **宿主适配** - 基于 Axum 运行，同步调度在阻塞线程池上执行

pub mod codec;
pub mod constants;
pub mod context;
pub mod exception_handler;
pub mod handler;
pub mod middleware;
pub mod rest;
pub mod router;
pub mod server;
pub mod session;
pub mod webi;

pub use codec::{Codec, CodecError, Codecs, JsonCodec, TextCodec};
pub use context::{QueryParams, WebiContext};
pub use exception_handler::{ErrorMessage, ExceptionHandler, ExceptionHandlerRegistry, WebError};
pub use handler::{Filter, RequestHandler};
pub use router::PathPatternMap;
pub use server::{ServerProperties, WebiServer};
pub use session::SessionFilter;
pub use webi::Webi;

pub mod prelude {
    //! 预导入模块

    pub use crate::codec::{Codec, Codecs};
    pub use crate::context::WebiContext;
    pub use crate::exception_handler::{ExceptionHandler, WebError};
    pub use crate::handler::{Filter, RequestHandler};
    pub use crate::rest::{
        ControllerMapping, FieldDescriptor, Invocation, ModelDescriptor, ParamType,
        ParameterDescriptor, RestController, RestServiceHandler, WebiController,
    };
    pub use crate::server::{ServerProperties, WebiServer};
    pub use crate::session::SessionFilter;
    pub use crate::webi::Webi;

    pub use http::{Method, StatusCode};
}
