//! 请求会话
//!
//! [`SessionFilter`] 在每个请求开始时打开一个会话对象，以线程作用域 Bean 的方式绑定到
//! 当前工作线程，并把绑定守卫挂到请求作用域上。调度结束时守卫被释放，绑定随之解除。
//! 控制器通过 `Inject<S>` 字段或 [`Invocation::session`](crate::rest::Invocation::session)
//! 拿到当前请求的会话。

use crate::context::WebiContext;
use crate::exception_handler::WebError;
use crate::handler::Filter;
use std::marker::PhantomData;
use std::sync::Arc;
use webi_core::{BeanContext, Injectable};

/// 为请求打开会话的过滤器
///
/// `opener` 返回 `None` 时不绑定会话，请求继续执行。
pub struct SessionFilter<S, F> {
    beans: Arc<BeanContext>,
    opener: F,
    _session: PhantomData<fn() -> S>,
}

impl<S, F> SessionFilter<S, F>
where
    S: Injectable,
    F: Fn(&WebiContext) -> Option<S> + Send + Sync,
{
    pub fn new(beans: Arc<BeanContext>, opener: F) -> Self {
        Self {
            beans,
            opener,
            _session: PhantomData,
        }
    }
}

impl<S, F> Filter for SessionFilter<S, F>
where
    S: Injectable,
    F: Fn(&WebiContext) -> Option<S> + Send + Sync,
{
    fn name(&self) -> &str {
        "session"
    }

    fn apply(&self, ctx: &mut WebiContext) -> Result<bool, WebError> {
        if let Some(session) = (self.opener)(ctx) {
            let guard = self.beans.bind_thread_local(Arc::new(session));
            ctx.attach_scope(guard);
            tracing::trace!(session = std::any::type_name::<S>(), path = ctx.request_path(), "Session bound");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    struct UserSession {
        user: String,
    }

    impl Injectable for UserSession {}

    #[test]
    fn test_session_bound_for_request_only() {
        let beans = Arc::new(BeanContext::new());
        let filter = SessionFilter::new(Arc::clone(&beans), |ctx: &WebiContext| {
            ctx.header("x-user").map(|user| UserSession {
                user: user.to_string(),
            })
        });

        let mut ctx = WebiContext::new(Method::GET, "/rest/x").with_header("x-user", "alice");
        assert!(filter.apply(&mut ctx).unwrap());
        assert_eq!(beans.instance::<UserSession>().unwrap().user, "alice");

        ctx.end_scope();
        assert!(beans.instance::<UserSession>().is_none());
        assert!(beans.contains::<UserSession>());
    }

    #[test]
    fn test_no_session_opened() {
        let beans = Arc::new(BeanContext::new());
        let filter = SessionFilter::new(Arc::clone(&beans), |_: &WebiContext| None::<UserSession>);

        let mut ctx = WebiContext::new(Method::GET, "/");
        assert!(filter.apply(&mut ctx).unwrap());
        assert!(!beans.contains::<UserSession>());
    }
}
