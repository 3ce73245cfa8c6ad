//! REST 请求处理器
//!
//! 每个请求经过：协商输出格式 → 解析操作 → 绑定参数 → 调用 → 序列化。
//! 解析、绑定和调用阶段的错误（包括操作中的 panic）交给异常处理器链生成响应体。

use super::binder::{refine, ParameterBinder};
use super::controller::RestController;
use super::invocation::Invocation;
use super::mapper::UrlMapper;
use crate::codec::{Codec, Codecs};
use crate::constants::{FORMAT_PARAMETER, WEBI_DEFAULT_FORMAT};
use crate::context::WebiContext;
use crate::exception_handler::{ExceptionHandler, ExceptionHandlerRegistry, WebError};
use crate::handler::RequestHandler;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use webi_core::utils::naming;
use webi_core::{BeanContext, Environment};

/// REST 请求处理器
pub struct RestServiceHandler {
    beans: Arc<BeanContext>,
    url_mapper: Arc<UrlMapper>,
    binder: ParameterBinder,
    codecs: Arc<Codecs>,
    exception_handlers: RwLock<ExceptionHandlerRegistry>,
}

impl RestServiceHandler {
    /// 创建处理器，并把 [`UrlMapper`] 以 `urlMapper` 注册到容器
    pub fn new(beans: Arc<BeanContext>) -> Self {
        Self::with_codecs(beans, Codecs::new())
    }

    /// 按配置 `webi.default-format` 选择默认输出格式
    pub fn from_environment(beans: Arc<BeanContext>, env: &Environment) -> Self {
        let codecs = match env.get_string(WEBI_DEFAULT_FORMAT) {
            Some(format) => Codecs::new().with_default_format(&format),
            None => Codecs::new(),
        };
        Self::with_codecs(beans, codecs)
    }

    pub fn with_codecs(beans: Arc<BeanContext>, codecs: Codecs) -> Self {
        let url_mapper = Arc::new(UrlMapper::new());
        let bean_name = naming::to_camel_case(naming::simple_type_name(std::any::type_name::<UrlMapper>()));
        beans.add_named(bean_name, Arc::clone(&url_mapper));

        let codecs = Arc::new(codecs);
        Self {
            beans,
            url_mapper,
            binder: ParameterBinder::new(Arc::clone(&codecs)),
            codecs,
            exception_handlers: RwLock::new(ExceptionHandlerRegistry::new()),
        }
    }

    /// 注册控制器到容器并暴露它的操作，返回 base URL
    pub fn expose<C: RestController>(&self, controller: Arc<C>) -> String {
        self.beans.add(Arc::clone(&controller));
        self.url_mapper.expose(controller)
    }

    /// 以指定 base URL 暴露控制器
    pub fn expose_at<C: RestController>(&self, controller: Arc<C>, base_url: &str) -> String {
        self.beans.add(Arc::clone(&controller));
        self.url_mapper.expose_at(controller, base_url)
    }

    pub fn add_exception_handler(&self, handler: Arc<dyn ExceptionHandler>) {
        self.exception_handlers.write().register(handler);
    }

    pub fn url_mapper(&self) -> &Arc<UrlMapper> {
        &self.url_mapper
    }

    pub fn codecs(&self) -> &Arc<Codecs> {
        &self.codecs
    }

    fn invoke(&self, ctx: &mut WebiContext) -> Result<Option<Value>, WebError> {
        let resolved = self
            .url_mapper
            .resolve(ctx.path(), ctx.method())
            .ok_or_else(|| WebError::not_found(format!("{} {}", ctx.method(), ctx.request_path())))?;
        ctx.set_path_params(resolved.path_params.clone());

        let operation = Arc::clone(&resolved.operation);
        let arguments = self.binder.bind(ctx, &operation)?;
        tracing::debug!(operation = operation.name(), url = %operation.url(), "Invoking operation");

        let outcome = {
            let mut invocation = Invocation::new(ctx, &self.beans, arguments);
            catch_unwind(AssertUnwindSafe(|| {
                operation.invoke(resolved.controller.as_ref(), &mut invocation)
            }))
        };

        let value = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(operation = operation.name(), error = %message, "Operation panicked");
                return Err(WebError::internal(message));
            }
        };

        match operation.return_type() {
            // 无返回值且已经写了输出流
            None if value.is_null() && ctx.has_output() => Ok(None),
            Some(return_type) => Ok(Some(refine(return_type, value))),
            None => Ok(Some(value)),
        }
    }

    fn write(&self, ctx: &mut WebiContext, codec: &dyn Codec, value: &Value) {
        match codec.encode(value) {
            Ok(bytes) => {
                ctx.output_mut().clear();
                ctx.write(&bytes);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response");
                ctx.send_error(500, &e.to_string());
            }
        }
    }
}

impl RequestHandler for RestServiceHandler {
    fn handle(&self, ctx: &mut WebiContext) -> Result<(), WebError> {
        let codec = self.codecs.negotiate(ctx.query_value(FORMAT_PARAMETER));
        ctx.set_response_type(codec.mime_type());

        match self.invoke(ctx) {
            Ok(Some(value)) => self.write(ctx, codec.as_ref(), &value),
            Ok(None) => {}
            Err(error) => {
                let body = self.exception_handlers.read().handle_error(ctx, &error);
                self.write(ctx, codec.as_ref(), &body);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RestServiceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestServiceHandler")
            .field("url_mapper", &self.url_mapper)
            .field("default_format", &self.codecs.default_format())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "Unknown panic occurred".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{ControllerMapping, ParamType, ParameterDescriptor};
    use http::Method;
    use serde_json::json;
    use webi_core::{Inject, Injectable, InjectionPoint};

    trait Greeting: Send + Sync {
        fn text(&self) -> String;
    }

    struct Polite;

    impl Greeting for Polite {
        fn text(&self) -> String {
            "good day".to_string()
        }
    }

    impl Injectable for Polite {}

    struct Hallo {
        greeting: Inject<dyn Greeting>,
    }

    impl Injectable for Hallo {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.greeting]
        }
    }

    impl RestController for Hallo {
        fn map(mapping: &mut ControllerMapping<Self>) {
            mapping
                .operation("greet", |hallo, _| Ok(hallo.greeting.require()?.text()))
                .returns(ParamType::String);
            mapping
                .operation("stream", |_, invocation| {
                    invocation.output().extend_from_slice(b"raw bytes");
                    Ok(())
                });
            mapping
                .operation("names", |_, _| Ok(Value::Null))
                .returns(ParamType::List);
            mapping
                .operation("boom", |_, _| -> Result<(), WebError> { panic!("exploded") });
            mapping
                .operation("echo", |_, invocation| invocation.arg::<i64>("n"))
                .param(ParameterDescriptor::new("n", ParamType::Int).required());
        }
    }

    fn handler() -> RestServiceHandler {
        let beans = Arc::new(BeanContext::new());
        let polite = Arc::new(Polite);
        beans.add_as::<dyn Greeting>(polite.clone(), polite);
        let handler = RestServiceHandler::new(beans);
        handler.expose(Arc::new(Hallo {
            greeting: Inject::new("greeting"),
        }));
        handler
    }

    fn call(handler: &RestServiceHandler, uri: &str) -> WebiContext {
        let mut ctx = WebiContext::new(Method::GET, uri);
        let path = uri.split('?').next().unwrap_or("/").to_string();
        ctx.set_route("", path);
        handler.handle(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_injected_controller_is_invoked() {
        let ctx = call(&handler(), "/hallo/greet");
        assert_eq!(ctx.status(), 200);
        assert_eq!(ctx.response_type(), Some("application/json"));
        assert_eq!(ctx.output(), br#""good day""#);
    }

    #[test]
    fn test_url_mapper_registered_by_name() {
        let handler = handler();
        assert!(handler.beans.contains_named("urlMapper"));
    }

    #[test]
    fn test_void_operation_keeps_streamed_output() {
        let ctx = call(&handler(), "/hallo/stream");
        assert_eq!(ctx.output(), b"raw bytes");
    }

    #[test]
    fn test_output_refined_by_return_type() {
        let ctx = call(&handler(), "/hallo/names");
        assert_eq!(ctx.output(), b"[]");
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let ctx = call(&handler(), "/hallo/boom");
        assert_eq!(ctx.status(), 500);
        let body: Value = serde_json::from_slice(ctx.output()).unwrap();
        assert_eq!(body["error"], json!(true));
        assert_eq!(body["code"], json!(500));
        assert!(body["msg"].as_str().unwrap().contains("exploded"));
    }

    #[test]
    fn test_unknown_operation_is_not_found() {
        let ctx = call(&handler(), "/hallo/missing");
        assert_eq!(ctx.status(), 404);
        let body: Value = serde_json::from_slice(ctx.output()).unwrap();
        assert_eq!(body["code"], json!(404));
    }

    #[test]
    fn test_format_negotiation() {
        let ctx = call(&handler(), "/hallo/greet?format=text");
        assert_eq!(ctx.response_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(ctx.output(), b"good day");

        let ctx = call(&handler(), "/hallo/echo?n=5&format=yaml");
        assert_eq!(ctx.response_type(), Some("application/json"));
        assert_eq!(ctx.output(), b"5");
    }

    #[test]
    fn test_default_format_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            webi_core::MapPropertySource::new("test").with_property(WEBI_DEFAULT_FORMAT, "text"),
        ));
        let handler = RestServiceHandler::from_environment(Arc::new(BeanContext::new()), &env);
        assert_eq!(handler.codecs().default_format(), "text");
    }

    struct Teapot;

    impl ExceptionHandler for Teapot {
        fn name(&self) -> &str {
            "teapot"
        }

        fn can_handle(&self, error: &WebError) -> bool {
            matches!(error, WebError::Client(_))
        }

        fn handle(&self, ctx: &mut WebiContext, _error: &WebError) -> Option<Value> {
            ctx.set_status(418);
            Some(json!({ "tea": true }))
        }
    }

    #[test]
    fn test_custom_exception_handler() {
        let handler = handler();
        handler.add_exception_handler(Arc::new(Teapot));

        let ctx = call(&handler, "/hallo/echo");
        assert_eq!(ctx.status(), 418);
        assert_eq!(ctx.output(), br#"{"tea":true}"#);
    }
}
