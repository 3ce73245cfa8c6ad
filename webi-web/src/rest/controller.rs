//! 控制器注册
//!
//! 控制器通过 [`RestController::map`] 声明自己的操作，不依赖注解或反射：
//!
//! ```
//! use std::sync::Arc;
//! use webi_core::Injectable;
//! use webi_web::rest::{ControllerMapping, ParamType, ParameterDescriptor, RestController, UrlMapper};
//!
//! struct Hallo;
//!
//! impl Injectable for Hallo {}
//!
//! impl RestController for Hallo {
//!     fn map(mapping: &mut ControllerMapping<Self>) {
//!         mapping
//!             .operation("world", |_hallo, _invocation| Ok("world"))
//!             .returns(ParamType::String);
//!         mapping
//!             .operation("broadcast", |_hallo, invocation| {
//!                 let text: String = invocation.arg("text")?;
//!                 Ok(text.len())
//!             })
//!             .param(ParameterDescriptor::new("text", ParamType::String).required())
//!             .returns(ParamType::Int);
//!     }
//! }
//!
//! let mapper = UrlMapper::new();
//! assert_eq!(mapper.expose(Arc::new(Hallo)), "hallo");
//! ```

use super::descriptor::{Invoker, ModelDescriptor, OperationDescriptor, ParamType, ParameterDescriptor};
use super::invocation::Invocation;
use super::mapper::normalize;
use crate::exception_handler::WebError;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use webi_core::utils::naming;
use webi_core::Injectable;

/// REST 控制器
pub trait RestController: Injectable + Sized {
    /// 声明 base URL 和操作
    fn map(mapping: &mut ControllerMapping<Self>);
}

/// 控制器的操作表，由 [`RestController::map`] 填写
pub struct ControllerMapping<C> {
    base_url: String,
    fixed_base: bool,
    operations: Vec<OperationSpec>,
    models: Vec<ModelDescriptor>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: RestController> ControllerMapping<C> {
    /// 运行 `C::map`，`base_url` 不为空时覆盖控制器声明的路径
    pub(crate) fn collect(base_url: Option<&str>) -> Self {
        let mut mapping = Self {
            base_url: naming::to_url_segment(std::any::type_name::<C>()),
            fixed_base: false,
            operations: Vec::new(),
            models: Vec::new(),
            _controller: PhantomData,
        };
        if let Some(base_url) = base_url {
            mapping.base_url = normalize(base_url);
            mapping.fixed_base = true;
        }
        C::map(&mut mapping);
        mapping
    }

    /// 控制器的 base URL，可以包含多个路径段
    pub fn path(&mut self, base_url: &str) -> &mut Self {
        if !self.fixed_base {
            self.base_url = normalize(base_url);
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 声明操作参数或返回值中用到的模型，服务描述据此输出字段
    pub fn model(&mut self, model: ModelDescriptor) -> &mut Self {
        self.models.push(model);
        self
    }

    /// 声明一个操作，method URL 默认为操作名，动词默认为 GET
    pub fn operation<R, F>(&mut self, name: &str, operation: F) -> &mut OperationSpec
    where
        R: Serialize,
        F: Fn(&C, &mut Invocation<'_>) -> Result<R, WebError> + Send + Sync + 'static,
    {
        let owner = std::any::type_name::<C>();
        let invoker: Invoker = Arc::new(
            move |controller: &(dyn Any + Send + Sync), invocation: &mut Invocation<'_>| -> Result<Value, WebError> {
                let controller = controller.downcast_ref::<C>().ok_or_else(|| {
                    WebError::internal(format!("controller instance is not a {}", owner))
                })?;
                let result = operation(controller, invocation)?;
                serde_json::to_value(result)
                    .map_err(|e| WebError::internal(format!("failed to serialize result: {}", e)))
            },
        );

        self.operations.push(OperationSpec {
            name: name.to_string(),
            method_url: None,
            verb: Method::GET,
            owner_type: owner,
            parameters: Vec::new(),
            return_type: None,
            internal: false,
            invoker,
        });
        let index = self.operations.len() - 1;
        &mut self.operations[index]
    }

    pub(crate) fn into_operations(self) -> (String, Vec<OperationDescriptor>, Vec<ModelDescriptor>) {
        let base_url = self.base_url;
        let operations = self
            .operations
            .into_iter()
            .map(|spec| spec.build(&base_url))
            .collect();
        (base_url, operations, self.models)
    }
}

/// 单个操作的声明
pub struct OperationSpec {
    name: String,
    method_url: Option<String>,
    verb: Method,
    owner_type: &'static str,
    parameters: Vec<ParameterDescriptor>,
    return_type: Option<ParamType>,
    internal: bool,
    invoker: Invoker,
}

impl OperationSpec {
    /// method URL，可以包含多个路径段
    pub fn path(&mut self, method_url: &str) -> &mut Self {
        self.method_url = Some(normalize(method_url));
        self
    }

    pub fn verb(&mut self, verb: Method) -> &mut Self {
        self.verb = verb;
        self
    }

    /// 追加参数，顺序即绑定顺序
    pub fn param(&mut self, parameter: ParameterDescriptor) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn returns(&mut self, return_type: ParamType) -> &mut Self {
        self.return_type = Some(return_type);
        self
    }

    /// 只在服务描述中标记为内部操作
    pub fn internal(&mut self) -> &mut Self {
        self.internal = true;
        self
    }

    fn build(self, base_url: &str) -> OperationDescriptor {
        let method_url = self.method_url.unwrap_or_else(|| self.name.clone());
        OperationDescriptor {
            base_url: base_url.to_string(),
            method_url,
            verb: self.verb,
            owner_type: self.owner_type,
            name: self.name,
            parameters: self.parameters,
            return_type: self.return_type,
            internal: self.internal,
            invoker: self.invoker,
        }
    }
}
