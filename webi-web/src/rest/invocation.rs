//! 操作调用
//!
//! [`Invocation`] 是操作闭包看到的全部输入：已绑定的参数、请求上下文和 Bean 容器。

use super::descriptor::ParamType;
use crate::context::WebiContext;
use crate::exception_handler::WebError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use webi_core::BeanContext;

/// 一个已绑定的参数
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    /// 由 [`Invocation`] 的访问方法提供
    Context(ParamType),
    Ignored,
}

/// 按声明顺序排列的参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: Vec<(String, Argument)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, argument: Argument) {
        self.entries.push((name.into(), argument));
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, argument)| argument)
    }

    pub fn at(&self, index: usize) -> Option<&Argument> {
        self.entries.get(index).map(|(_, argument)| argument)
    }

    /// 参数值，上下文参数和被忽略的参数返回 None
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Argument::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.entries.iter().map(|(name, argument)| (name.as_str(), argument))
    }
}

/// 一次操作调用
pub struct Invocation<'a> {
    ctx: &'a mut WebiContext,
    beans: &'a BeanContext,
    arguments: Arguments,
}

impl<'a> Invocation<'a> {
    pub fn new(ctx: &'a mut WebiContext, beans: &'a BeanContext, arguments: Arguments) -> Self {
        Self { ctx, beans, arguments }
    }

    /// 按有效名称取参数并反序列化
    ///
    /// 被忽略的参数按 `null` 反序列化，因此可以用 `Option<T>` 接收。
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, WebError> {
        let value = match self.arguments.get(name) {
            Some(Argument::Value(value)) => value.clone(),
            Some(Argument::Ignored) => Value::Null,
            Some(Argument::Context(kind)) => {
                return Err(WebError::internal(format!(
                    "parameter '{}' is a {} parameter, use the invocation accessors",
                    name,
                    kind.type_name()
                )))
            }
            None => return Err(WebError::internal(format!("unknown parameter: {}", name))),
        };
        serde_json::from_value(value)
            .map_err(|e| WebError::client(format!("invalid value for parameter '{}': {}", name, e)))
    }

    /// 按位置取参数值
    pub fn arg_at(&self, index: usize) -> Option<&Value> {
        match self.arguments.at(index) {
            Some(Argument::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn context(&self) -> &WebiContext {
        &*self.ctx
    }

    pub fn context_mut(&mut self) -> &mut WebiContext {
        &mut *self.ctx
    }

    /// 请求体
    pub fn input(&self) -> &[u8] {
        self.ctx.body()
    }

    /// 输出流，写入内容后无返回值的操作不再序列化结果
    pub fn output(&mut self) -> &mut Vec<u8> {
        self.ctx.output_mut()
    }

    /// 当前请求的会话
    pub fn session<S: webi_core::Injectable>(&self) -> Result<Arc<S>, WebError> {
        match self.beans.get::<S>() {
            Some(bean) => Ok(bean.try_get()?),
            None => Err(WebError::http(401, "No session")),
        }
    }

    /// 按类型取 Bean
    pub fn bean<T>(&self) -> Result<Arc<T>, WebError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.beans.get::<T>() {
            Some(bean) => Ok(bean.try_get()?),
            None => Err(WebError::Bean(webi_core::BeanError::BeanNotFound(
                std::any::type_name::<T>().to_string(),
            ))),
        }
    }
}
