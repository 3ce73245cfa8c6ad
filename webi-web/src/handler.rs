//! 处理器与过滤器
//!
//! 一个请求路径只会交给一个 [`RequestHandler`]（最长前缀），但可以经过多个 [`Filter`]。

use crate::context::WebiContext;
use crate::exception_handler::WebError;

/// 终端处理器，负责生成响应
pub trait RequestHandler: Send + Sync {
    /// 处理请求
    ///
    /// 调用时 `ctx.base()` 是匹配到的前缀，`ctx.path()` 是去掉前缀后的剩余路径。
    /// 返回的错误由调度器转换为纯文本错误响应。
    fn handle(&self, ctx: &mut WebiContext) -> Result<(), WebError>;
}

/// 请求前置处理
pub trait Filter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 返回 `Ok(false)` 中止后续过滤器和处理器，此时响应保持过滤器修改后的样子
    fn apply(&self, ctx: &mut WebiContext) -> Result<bool, WebError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut WebiContext) -> Result<(), WebError> + Send + Sync,
{
    fn handle(&self, ctx: &mut WebiContext) -> Result<(), WebError> {
        self(ctx)
    }
}

impl<F> Filter for F
where
    F: Fn(&mut WebiContext) -> Result<bool, WebError> + Send + Sync,
{
    fn apply(&self, ctx: &mut WebiContext) -> Result<bool, WebError> {
        self(ctx)
    }
}
