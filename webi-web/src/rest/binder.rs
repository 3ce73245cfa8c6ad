//! 参数绑定
//!
//! 每个参数按声明顺序依次确定来源：
//!
//! 1. `ignored`：不绑定
//! 2. PATH：操作路径之后的下一个位置段
//! 3. HEADER：同名请求头，标量类型做文本转换
//! 4. BODY：按请求 Content-Type 选择编解码器解码请求体
//! 5. 上下文类型（输入流、输出流、请求上下文、会话）：由 [`Invocation`](super::Invocation) 提供
//! 6. 其余（AUTO）：同名查询参数，缺失时取默认值
//!
//! 之后对结果做空值收敛：`null` 字符串变为 `""`，`null` 集合变为空集合，`null` 映射变为 `{}`。

use super::descriptor::{BindingSource, OperationDescriptor, ParamType, ParameterDescriptor};
use super::invocation::{Argument, Arguments};
use crate::codec::Codecs;
use crate::context::WebiContext;
use crate::exception_handler::WebError;
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::sync::Arc;

/// 参数绑定器
#[derive(Clone)]
pub struct ParameterBinder {
    codecs: Arc<Codecs>,
}

impl ParameterBinder {
    pub fn new(codecs: Arc<Codecs>) -> Self {
        Self { codecs }
    }

    /// 为操作构建参数列表
    pub fn bind(&self, ctx: &WebiContext, operation: &OperationDescriptor) -> Result<Arguments, WebError> {
        let mut arguments = Arguments::new();
        let mut path_params = ctx.path_params().iter();

        for param in operation.parameters() {
            if param.is_ignored() {
                arguments.push(param.name(), Argument::Ignored);
                continue;
            }

            let value = match param.binding_source() {
                BindingSource::Path => match path_params.next() {
                    Some(segment) => text_value(param, &decode_segment(param, segment)?)?,
                    None => Value::Null,
                },
                BindingSource::Header => match ctx.header(param.name()) {
                    Some(header) => text_value(param, header)?,
                    None => Value::Null,
                },
                BindingSource::Body => self.body_value(ctx, param)?,
                BindingSource::Auto if param.is_context() => {
                    arguments.push(param.name(), Argument::Context(param.declared_type().clone()));
                    continue;
                }
                BindingSource::Auto => query_value(ctx, param)?,
            };

            let value = refine(param.declared_type(), value);
            if param.is_required() && is_missing(param.declared_type(), &value) {
                return Err(WebError::client(format!("missing required parameter: {}", param.name())));
            }
            arguments.push(param.name(), Argument::Value(value));
        }

        Ok(arguments)
    }

    fn body_value(&self, ctx: &WebiContext, param: &ParameterDescriptor) -> Result<Value, WebError> {
        if ctx.body().is_empty() {
            return Ok(Value::Null);
        }
        let codec = ctx
            .request_type()
            .and_then(|mime| self.codecs.by_mime_type(mime))
            .unwrap_or_else(|| self.codecs.default_codec());

        codec.decode(ctx.body()).map_err(|e| {
            WebError::client(format!("malformed body for parameter '{}': {}", param.name(), e))
        })
    }
}

/// 从单个文本值绑定：标量做转换，其他类型原样传递
/// 路径段按 UTF-8 做百分号解码
fn decode_segment<'a>(param: &ParameterDescriptor, segment: &'a str) -> Result<Cow<'a, str>, WebError> {
    percent_decode_str(segment).decode_utf8().map_err(|_| {
        WebError::client(format!("path parameter '{}' is not valid UTF-8", param.name()))
    })
}

fn text_value(param: &ParameterDescriptor, raw: &str) -> Result<Value, WebError> {
    if param.declared_type().is_scalar() {
        convert(param.name(), param.declared_type(), raw)
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

fn query_value(ctx: &WebiContext, param: &ParameterDescriptor) -> Result<Value, WebError> {
    let mut values: Vec<String> = ctx.query().get_all(param.name()).to_vec();
    if values.is_empty() {
        values = param.defaults().to_vec();
    }

    match param.declared_type() {
        ParamType::Array(element) => values
            .iter()
            .map(|raw| convert(param.name(), element, raw))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ParamType::List => Ok(Value::Array(values.into_iter().map(Value::String).collect())),
        ParamType::Set => {
            let mut unique: Vec<String> = Vec::with_capacity(values.len());
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            Ok(Value::Array(unique.into_iter().map(Value::String).collect()))
        }
        ParamType::Map => Ok(Value::Null),
        scalar if scalar.is_scalar() => match values.first() {
            Some(first) => convert(param.name(), scalar, first),
            None => Ok(Value::Null),
        },
        _ => Ok(values.into_iter().next().map(Value::String).unwrap_or(Value::Null)),
    }
}

/// 文本到标量的转换
///
/// 非字符串类型的空文本视为缺失。
pub fn convert(name: &str, declared_type: &ParamType, raw: &str) -> Result<Value, WebError> {
    let text = raw.trim();
    if text.is_empty() && *declared_type != ParamType::String {
        return Ok(Value::Null);
    }

    let invalid = |expected: &str| {
        WebError::client(format!(
            "invalid value for parameter '{}': expected {}, got '{}'",
            name, expected, raw
        ))
    };

    match declared_type {
        ParamType::String => Ok(Value::String(raw.to_string())),
        ParamType::Bool => match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        ParamType::Int => text
            .parse::<i64>()
            .map(|number| Value::Number(number.into()))
            .map_err(|_| invalid("integer")),
        ParamType::Float => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("number")),
        ParamType::Timestamp => parse_timestamp(text)
            .map(|timestamp| Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .ok_or_else(|| invalid("RFC 3339 timestamp or epoch milliseconds")),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    match text.parse::<i64>() {
        Ok(millis) => DateTime::from_timestamp_millis(millis),
        Err(_) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
    }
}

/// 空值收敛
pub fn refine(declared_type: &ParamType, value: Value) -> Value {
    if !value.is_null() {
        return value;
    }
    match declared_type {
        ParamType::String => Value::String(String::new()),
        ParamType::Array(_) | ParamType::List | ParamType::Set => Value::Array(Vec::new()),
        ParamType::Map => Value::Object(Map::new()),
        _ => Value::Null,
    }
}

/// 必填参数视为缺失的值
pub fn is_missing(declared_type: &ParamType, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) if text.is_empty() => true,
        Value::String(text) if *declared_type == ParamType::Timestamp => {
            parse_timestamp(text).map_or(true, |timestamp| timestamp.timestamp_millis() == 0)
        }
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
