//! 请求调度
//!
//! [`Webi`] 持有处理器表和过滤器表：
//!
//! 1. 按最长前缀选出处理器，把前缀从路径中去掉
//! 2. 按注册顺序执行所有匹配完整请求路径的过滤器，任何一个返回 `false` 都会中止
//! 3. 调用处理器；没有处理器时返回 404
//! 4. 释放请求作用域资源（线程作用域 Bean 的绑定等）

use crate::context::WebiContext;
use crate::handler::{Filter, RequestHandler};
use crate::router::PathPatternMap;
use parking_lot::RwLock;
use std::sync::Arc;
use webi_core::BeanContext;

/// Webi 调度器
pub struct Webi {
    beans: Arc<BeanContext>,
    handlers: RwLock<PathPatternMap<Arc<dyn RequestHandler>>>,
    filters: RwLock<PathPatternMap<Arc<dyn Filter>>>,
}

impl Webi {
    pub fn new(beans: Arc<BeanContext>) -> Self {
        Self {
            beans,
            handlers: RwLock::new(PathPatternMap::new()),
            filters: RwLock::new(PathPatternMap::new()),
        }
    }

    /// 共享的 Bean 容器
    pub fn beans(&self) -> &Arc<BeanContext> {
        &self.beans
    }

    /// 在前缀上注册处理器，同一前缀重复注册时后注册的生效
    pub fn add_handler<H>(&self, prefix: &str, handler: H) -> Arc<H>
    where
        H: RequestHandler + 'static,
    {
        let handler = Arc::new(handler);
        self.handlers
            .write()
            .put(prefix, Arc::clone(&handler) as Arc<dyn RequestHandler>);
        tracing::info!(prefix = prefix, handler = std::any::type_name::<H>(), "Request handler registered");
        handler
    }

    /// 在前缀上注册过滤器，同一前缀可以注册多个
    pub fn add_filter<F>(&self, prefix: &str, filter: F) -> Arc<F>
    where
        F: Filter + 'static,
    {
        let filter = Arc::new(filter);
        self.filters
            .write()
            .put(prefix, Arc::clone(&filter) as Arc<dyn Filter>);
        tracing::info!(prefix = prefix, filter = filter.name(), "Filter registered");
        filter
    }

    /// 处理一个请求，结果写入 `ctx`
    pub fn dispatch(&self, ctx: &mut WebiContext) {
        let request_path = ctx.request_path().to_string();

        let route = {
            let handlers = self.handlers.read();
            handlers
                .route(&request_path)
                .map(|(prefix, handler, remainder)| (prefix.to_string(), Arc::clone(handler), remainder))
        };
        if let Some((prefix, _, remainder)) = &route {
            ctx.set_route(prefix, remainder.clone());
        }

        let filters: Vec<Arc<dyn Filter>> = self
            .filters
            .read()
            .get_all(&request_path)
            .into_iter()
            .cloned()
            .collect();

        let proceed = self.apply_filters(&filters, ctx);
        if proceed {
            match route {
                Some((prefix, handler, _)) => {
                    tracing::debug!(path = %request_path, prefix = %prefix, "Dispatching request");
                    if let Err(error) = handler.handle(ctx) {
                        tracing::warn!(path = %request_path, error = %error, "Handler failed");
                        ctx.send_error(error.status_code().as_u16(), &error.to_string());
                    }
                }
                None => {
                    tracing::debug!(path = %request_path, "No handler matched");
                    ctx.send_error(404, "Not found");
                }
            }
        }

        ctx.end_scope();
    }

    fn apply_filters(&self, filters: &[Arc<dyn Filter>], ctx: &mut WebiContext) -> bool {
        for filter in filters {
            match filter.apply(ctx) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(filter = filter.name(), path = ctx.request_path(), "Request stopped by filter");
                    return false;
                }
                Err(error) => {
                    tracing::warn!(filter = filter.name(), error = %error, "Filter failed");
                    ctx.send_error(error.status_code().as_u16(), &error.to_string());
                    return false;
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for Webi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webi")
            .field("handlers", &*self.handlers.read())
            .field("filters", &*self.filters.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception_handler::WebError;
    use http::Method;
    use parking_lot::Mutex;

    fn webi() -> Webi {
        Webi::new(Arc::new(BeanContext::new()))
    }

    struct Echo(&'static str);

    impl RequestHandler for Echo {
        fn handle(&self, ctx: &mut WebiContext) -> Result<(), WebError> {
            let line = format!("{}:{}:{}", self.0, ctx.base(), ctx.path());
            ctx.write(line.as_bytes());
            Ok(())
        }
    }

    #[test]
    fn test_longest_prefix_handler_selected() {
        let webi = webi();
        webi.add_handler("/", Echo("root"));
        webi.add_handler("/rest/", Echo("rest"));

        let mut ctx = WebiContext::new(Method::GET, "/rest/hallo/world/");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.output(), b"rest:/rest/:/hallo/world/");

        let mut ctx = WebiContext::new(Method::GET, "/index.html");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.output(), b"root:/:/index.html");
    }

    #[test]
    fn test_later_handler_replaces_earlier() {
        let webi = webi();
        webi.add_handler("/rest/", Echo("first"));
        webi.add_handler("/rest/", Echo("second"));

        let mut ctx = WebiContext::new(Method::GET, "/rest/x");
        webi.dispatch(&mut ctx);
        assert!(ctx.output().starts_with(b"second"));
    }

    #[test]
    fn test_not_found() {
        let webi = webi();
        webi.add_handler("/rest/", Echo("rest"));

        let mut ctx = WebiContext::new(Method::GET, "/static/app.js");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.status(), 404);
        assert_eq!(ctx.output(), b"Not found");
    }

    #[test]
    fn test_filter_stop_skips_handler() {
        let webi = webi();
        webi.add_handler("/", Echo("root"));
        webi.add_filter("/admin/", |ctx: &mut WebiContext| -> Result<bool, WebError> {
            ctx.set_status(403);
            ctx.write(b"denied");
            Ok(false)
        });

        let mut ctx = WebiContext::new(Method::GET, "/admin/users");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.status(), 403);
        assert_eq!(ctx.output(), b"denied");

        let mut ctx = WebiContext::new(Method::GET, "/public");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.status(), 200);
    }

    #[test]
    fn test_filter_error_becomes_response() {
        let webi = webi();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        webi.add_handler("/", move |_ctx: &mut WebiContext| -> Result<(), WebError> {
            *counter.lock() += 1;
            Ok(())
        });
        webi.add_filter("/", |_ctx: &mut WebiContext| -> Result<bool, WebError> {
            Err(WebError::http(401, "Unauthorized"))
        });

        let mut ctx = WebiContext::new(Method::GET, "/x");
        webi.dispatch(&mut ctx);
        assert_eq!(ctx.status(), 401);
        assert_eq!(ctx.output(), b"Unauthorized");
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_scope_released_after_dispatch() {
        let webi = webi();
        let released = Arc::new(Mutex::new(false));

        struct Release(Arc<Mutex<bool>>);
        impl Drop for Release {
            fn drop(&mut self) {
                *self.0.lock() = true;
            }
        }

        let flag = Arc::clone(&released);
        webi.add_filter("/", move |ctx: &mut WebiContext| -> Result<bool, WebError> {
            ctx.attach_scope(Release(Arc::clone(&flag)));
            Ok(true)
        });

        let mut ctx = WebiContext::new(Method::GET, "/anything");
        webi.dispatch(&mut ctx);
        assert!(*released.lock());
    }
}
