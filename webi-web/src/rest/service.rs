//! 服务描述
//!
//! [`WebiController`] 以 `webi` 暴露，`GET <前缀>/webi/service` 返回所有已暴露控制器的操作列表，
//! 供客户端生成调用代码。

use super::controller::{ControllerMapping, RestController};
use super::descriptor::{BindingSource, FieldDescriptor, OperationDescriptor, ParamType, ParameterDescriptor};
use super::mapper::UrlMapper;
use crate::exception_handler::WebError;
use serde_json::{json, Map, Value};
use webi_core::utils::naming;
use webi_core::{Inject, Injectable, InjectionPoint};

/// 服务描述控制器
pub struct WebiController {
    url_mapper: Inject<UrlMapper>,
}

impl WebiController {
    pub fn new() -> Self {
        Self {
            url_mapper: Inject::new("urlMapper"),
        }
    }

    /// 生成服务描述，`base` 为 REST 处理器的前缀
    pub fn service(&self, base: &str) -> Result<Value, WebError> {
        let url_mapper = self.url_mapper.require()?;

        let mut controllers = Map::new();
        let mut models = Map::new();
        for (base_url, operations) in url_mapper.methods() {
            let type_name = url_mapper
                .controller_type(&base_url)
                .ok_or_else(|| WebError::internal(format!("no controller for base url: {}", base_url)))?;

            let mut methods = Map::new();
            for operation in &operations {
                collect_models(&url_mapper, operation, &mut models);
                let entries = methods
                    .entry(operation.name().to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(entries) = entries {
                    entries.push(describe_operation(&operation));
                }
            }

            controllers.insert(
                naming::simple_type_name(type_name).to_string(),
                json!({ "url": base_url, "methods": methods }),
            );
        }

        Ok(json!({
            "url": base,
            "methods": controllers,
            "models": models,
        }))
    }
}

impl Default for WebiController {
    fn default() -> Self {
        Self::new()
    }
}

impl Injectable for WebiController {
    fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
        vec![&self.url_mapper]
    }
}

impl RestController for WebiController {
    fn map(mapping: &mut ControllerMapping<Self>) {
        mapping.path("webi");
        mapping
            .operation("service", |webi, invocation| webi.service(invocation.context().base()))
            .param(ParameterDescriptor::new("context", ParamType::Context))
            .returns(ParamType::Object("Service"));
    }
}

fn describe_operation(operation: &OperationDescriptor) -> Value {
    let mut entry = Map::new();
    entry.insert("name".to_string(), json!(operation.name()));
    entry.insert("method".to_string(), json!(operation.verb().as_str()));
    entry.insert("url".to_string(), json!(operation.url()));
    if operation.is_internal() {
        entry.insert("internal".to_string(), json!(true));
    }
    if let Some(return_type) = operation.return_type() {
        entry.insert("returns".to_string(), json!(return_type.type_name()));
    }
    if !operation.parameters().is_empty() {
        let args: Vec<Value> = operation
            .parameters()
            .iter()
            .filter(|param| !param.is_ignored() && !param.is_context())
            .map(describe_parameter)
            .collect();
        entry.insert("args".to_string(), Value::Array(args));
    }
    Value::Object(entry)
}

fn describe_parameter(param: &ParameterDescriptor) -> Value {
    let mut arg = Map::new();
    match param.defaults() {
        [] => {}
        [single] if single.is_empty() => {}
        [single] => {
            arg.insert("defaultValue".to_string(), json!(single));
        }
        many => {
            arg.insert("defaultValue".to_string(), json!(many));
        }
    }
    let required = param.is_required() || param.binding_source() == BindingSource::Body;
    arg.insert("required".to_string(), json!(required));
    arg.insert("name".to_string(), json!(param.name()));
    arg.insert("type".to_string(), json!(param.declared_type().type_name()));
    arg.insert("transport".to_string(), json!(param.binding_source().transport()));
    Value::Object(arg)
}

/// 操作参数和返回值引用的模型
fn collect_models(url_mapper: &UrlMapper, operation: &OperationDescriptor, models: &mut Map<String, Value>) {
    let declared = operation
        .parameters()
        .iter()
        .map(|param| param.declared_type())
        .chain(operation.return_type());
    for declared_type in declared {
        if let Some(name) = model_name(declared_type) {
            write_model(url_mapper, name, models);
        }
    }
}

/// 写入模型及其字段引用的模型，未声明字段的模型输出空对象
fn write_model(url_mapper: &UrlMapper, name: &str, models: &mut Map<String, Value>) {
    if models.contains_key(name) {
        return;
    }
    // 先占位，自引用的模型不会重复展开
    models.insert(name.to_string(), json!({}));

    let Some(model) = url_mapper.model(name) else {
        return;
    };
    let mut fields = Map::new();
    for field in model.fields() {
        fields.insert(field.field().to_string(), describe_field(field));
    }
    models.insert(name.to_string(), Value::Object(fields));

    for field in model.fields() {
        if let Some(nested) = model_name(field.field_type()) {
            write_model(url_mapper, nested, models);
        }
    }
}

fn describe_field(field: &FieldDescriptor) -> Value {
    let mut node = Map::new();
    node.insert("name".to_string(), json!(field.name()));
    node.insert("description".to_string(), json!(field.describe()));
    node.insert("required".to_string(), json!(field.is_required()));
    if field.is_enum() {
        node.insert("type".to_string(), json!("enum"));
        node.insert("enum".to_string(), json!(field.constants()));
    } else {
        node.insert("type".to_string(), json!(field.field_type().type_name()));
    }
    Value::Object(node)
}

fn model_name(declared_type: &ParamType) -> Option<&'static str> {
    match declared_type {
        ParamType::Object(name) => Some(*name),
        ParamType::Array(element) => model_name(element),
        _ => None,
    }
}
