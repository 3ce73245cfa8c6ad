//! 操作与参数描述
//!
//! 描述在注册时由 [`ControllerMapping`](super::ControllerMapping) 构建，之后只读。

use super::invocation::Invocation;
use crate::exception_handler::WebError;
use http::Method;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 参数或返回值的声明类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Bool,
    Int,
    Float,
    /// RFC 3339 文本或毫秒时间戳，绑定后统一为 RFC 3339 文本
    Timestamp,
    /// 元素逐个转换的数组
    Array(Box<ParamType>),
    List,
    Set,
    Map,
    /// 命名的模型类型
    Object(&'static str),
    InputStream,
    OutputStream,
    Context,
    Session,
}

impl ParamType {
    pub fn array_of(element: ParamType) -> Self {
        ParamType::Array(Box::new(element))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ParamType::String | ParamType::Bool | ParamType::Int | ParamType::Float | ParamType::Timestamp
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ParamType::Array(_) | ParamType::List | ParamType::Set)
    }

    /// 由请求上下文直接提供，不从请求数据绑定
    pub fn is_context(&self) -> bool {
        matches!(
            self,
            ParamType::InputStream | ParamType::OutputStream | ParamType::Context | ParamType::Session
        )
    }

    /// 服务描述中使用的类型名
    pub fn type_name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Bool => "boolean".to_string(),
            ParamType::Int => "integer".to_string(),
            ParamType::Float => "number".to_string(),
            ParamType::Timestamp => "timestamp".to_string(),
            ParamType::Array(element) => format!("{}[]", element.type_name()),
            ParamType::List | ParamType::Set => "string[]".to_string(),
            ParamType::Map => "map".to_string(),
            ParamType::Object(name) => name.to_string(),
            ParamType::InputStream => "input".to_string(),
            ParamType::OutputStream => "output".to_string(),
            ParamType::Context => "context".to_string(),
            ParamType::Session => "session".to_string(),
        }
    }
}

/// 参数来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// URL 中操作路径之后的位置段
    Path,
    Header,
    Body,
    /// 查询参数，缺失时使用默认值
    Auto,
}

impl BindingSource {
    /// 服务描述中的 transport 名称
    pub fn transport(&self) -> &'static str {
        match self {
            BindingSource::Path => "PATH",
            BindingSource::Header => "HEADER",
            BindingSource::Body => "BODY",
            BindingSource::Auto => "GET",
        }
    }
}

/// 参数描述
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    declared_name: String,
    binding_name: Option<String>,
    declared_type: ParamType,
    source: BindingSource,
    required: bool,
    default_values: Vec<String>,
    ignore: bool,
}

impl ParameterDescriptor {
    /// 从查询参数绑定
    pub fn new(name: impl Into<String>, declared_type: ParamType) -> Self {
        Self {
            declared_name: name.into(),
            binding_name: None,
            declared_type,
            source: BindingSource::Auto,
            required: false,
            default_values: Vec::new(),
            ignore: false,
        }
    }

    pub fn path(name: impl Into<String>, declared_type: ParamType) -> Self {
        Self::new(name, declared_type).source(BindingSource::Path)
    }

    pub fn header(name: impl Into<String>, declared_type: ParamType) -> Self {
        Self::new(name, declared_type).source(BindingSource::Header)
    }

    pub fn body(name: impl Into<String>, declared_type: ParamType) -> Self {
        Self::new(name, declared_type).source(BindingSource::Body)
    }

    pub fn source(mut self, source: BindingSource) -> Self {
        self.source = source;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_values = vec![value.into()];
        self
    }

    pub fn default_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// 绑定时使用的名称，覆盖声明名称
    pub fn named(mut self, binding_name: impl Into<String>) -> Self {
        self.binding_name = Some(binding_name.into());
        self
    }

    /// 不绑定任何值
    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// 有效名称：绑定名称优先，否则为声明名称
    pub fn name(&self) -> &str {
        self.binding_name.as_deref().unwrap_or(&self.declared_name)
    }

    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    pub fn declared_type(&self) -> &ParamType {
        &self.declared_type
    }

    pub fn binding_source(&self) -> BindingSource {
        self.source
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn defaults(&self) -> &[String] {
        &self.default_values
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore
    }

    pub fn is_context(&self) -> bool {
        self.declared_type.is_context()
    }
}

/// 模型字段
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    field: String,
    label: Option<String>,
    field_type: ParamType,
    description: String,
    required: bool,
    constants: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(field: impl Into<String>, field_type: ParamType) -> Self {
        Self {
            field: field.into(),
            label: None,
            field_type,
            description: String::new(),
            required: false,
            constants: Vec::new(),
        }
    }

    /// 对外名称，默认为字段名
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 枚举字段的取值
    pub fn one_of<I, S>(mut self, constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constants = constants.into_iter().map(Into::into).collect();
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.field)
    }

    pub fn field_type(&self) -> &ParamType {
        &self.field_type
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    pub fn is_enum(&self) -> bool {
        !self.constants.is_empty()
    }
}

/// 命名模型，对应 [`ParamType::Object`] 中的名称
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    /// 追加字段，顺序即声明顺序
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// 类型擦除后的操作调用
pub type Invoker =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut Invocation<'_>) -> Result<Value, WebError> + Send + Sync>;

/// 操作描述
#[derive(Clone)]
pub struct OperationDescriptor {
    pub(crate) base_url: String,
    pub(crate) method_url: String,
    pub(crate) verb: Method,
    pub(crate) owner_type: &'static str,
    pub(crate) name: String,
    pub(crate) parameters: Vec<ParameterDescriptor>,
    pub(crate) return_type: Option<ParamType>,
    pub(crate) internal: bool,
    pub(crate) invoker: Invoker,
}

impl OperationDescriptor {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn method_url(&self) -> &str {
        &self.method_url
    }

    /// `base/method`
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.method_url)
    }

    pub fn verb(&self) -> &Method {
        &self.verb
    }

    /// 所属控制器的类型名
    pub fn owner_type(&self) -> &'static str {
        self.owner_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// 返回类型，`None` 表示无返回值
    pub fn return_type(&self) -> Option<&ParamType> {
        self.return_type.as_ref()
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn invoke(
        &self,
        controller: &(dyn Any + Send + Sync),
        invocation: &mut Invocation<'_>,
    ) -> Result<Value, WebError> {
        (self.invoker)(controller, invocation)
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("url", &self.url())
            .field("verb", &self.verb)
            .field("owner_type", &self.owner_type)
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("return_type", &self.return_type)
            .field("internal", &self.internal)
            .finish()
    }
}
