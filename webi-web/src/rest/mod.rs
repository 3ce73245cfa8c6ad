//! REST 控制器支持
//!
//! - [`RestController`] / [`ControllerMapping`]：注册时声明操作
//! - [`UrlMapper`]：`base URL -> method URL -> 动词` 分发表
//! - [`ParameterBinder`]：把请求数据绑定为参数
//! - [`RestServiceHandler`]：挂到 [`Webi`](crate::Webi) 上的请求处理器
//! - [`WebiController`]：服务描述

pub mod binder;
pub mod controller;
pub mod descriptor;
pub mod handler;
pub mod invocation;
pub mod mapper;
pub mod service;

pub use binder::ParameterBinder;
pub use controller::{ControllerMapping, OperationSpec, RestController};
pub use descriptor::{
    BindingSource, FieldDescriptor, Invoker, ModelDescriptor, OperationDescriptor, ParamType,
    ParameterDescriptor,
};
pub use handler::RestServiceHandler;
pub use invocation::{Argument, Arguments, Invocation};
pub use mapper::{ControllerInstance, ResolvedOperation, UrlMapper};
pub use service::WebiController;
