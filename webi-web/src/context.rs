//! 请求上下文
//!
//! [`WebiContext`] 同时承载请求（方法、路径、查询参数、请求头、请求体）和正在构建的响应
//! （状态码、响应头、输出缓冲），在过滤器、处理器和 REST 操作之间以 `&mut` 传递。

use crate::exception_handler::WebError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// 查询参数，同名参数保留所有值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            values.entry(name.into_owned()).or_default().push(value.into_owned());
        }
        Self { values }
    }

    /// 第一个值
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_default().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 请求上下文
pub struct WebiContext {
    method: Method,
    request_path: String,
    base: String,
    path: String,
    query: QueryParams,
    headers: HeaderMap,
    body: Bytes,
    path_params: Vec<String>,

    status: StatusCode,
    response_headers: HeaderMap,
    output: Vec<u8>,

    /// 请求结束时释放的资源，例如线程作用域 Bean 的绑定守卫
    scope: Vec<Box<dyn Any + Send>>,
}

impl WebiContext {
    /// `uri` 可以带查询字符串，例如 `/rest/hallo/broadcast?text=hi`
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        Self::build(method, path, query, HeaderMap::new(), Bytes::new())
    }

    /// 从 HTTP 请求的各部分构建
    pub fn from_parts(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self::build(method, uri.path(), uri.query().unwrap_or(""), headers, body)
    }

    fn build(method: Method, path: &str, query: &str, headers: HeaderMap, body: Bytes) -> Self {
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            request_path: path.to_string(),
            base: String::new(),
            path: path.to_string(),
            query: QueryParams::parse(query),
            headers,
            body,
            path_params: Vec::new(),
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            output: Vec::new(),
            scope: Vec::new(),
        }
    }

    /// 添加请求头，名称或值非法时忽略
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "Ignoring invalid request header"),
        }
        self
    }

    /// 设置请求体和 Content-Type
    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        if let Ok(value) = HeaderValue::try_from(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self.body = body.into();
        self
    }

    // ========== 请求 ==========

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 完整的请求路径
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// 匹配到的处理器前缀，没有匹配时为空
    pub fn base(&self) -> &str {
        &self.base
    }

    /// 去掉处理器前缀后的路径，总是以 `/` 开头
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn set_route(&mut self, base: &str, path: String) {
        self.base = base.to_string();
        self.path = path;
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// 请求的 Content-Type
    pub fn request_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// URL 中操作路径之后的位置参数
    pub fn path_params(&self) -> &[String] {
        &self.path_params
    }

    pub(crate) fn set_path_params(&mut self, params: Vec<String>) {
        self.path_params = params;
    }

    // ========== 响应 ==========

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// 设置状态码，非法值按 500 处理
    pub fn set_status(&mut self, code: u16) {
        self.status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), WebError> {
        let header = HeaderName::try_from(name)
            .map_err(|e| WebError::internal(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| WebError::internal(format!("invalid value for header '{}': {}", name, e)))?;
        self.response_headers.insert(header, value);
        Ok(())
    }

    /// 响应的 Content-Type
    pub fn response_type(&self) -> Option<&str> {
        self.response_headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn set_response_type(&mut self, mime: &str) {
        if let Ok(value) = HeaderValue::try_from(mime) {
            self.response_headers.insert(CONTENT_TYPE, value);
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// 输出流
    pub fn output_mut(&mut self) -> &mut Vec<u8> {
        &mut self.output
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// 传输层错误：丢弃已有输出，写入纯文本消息
    pub fn send_error(&mut self, code: u16, message: &str) {
        self.set_status(code);
        self.set_response_type("text/plain; charset=utf-8");
        self.output.clear();
        self.output.extend_from_slice(message.as_bytes());
    }

    // ========== 请求作用域 ==========

    /// 在请求结束时释放的资源
    pub fn attach_scope(&mut self, resource: impl Any + Send) {
        self.scope.push(Box::new(resource));
    }

    /// 按附加的相反顺序释放请求作用域资源
    pub fn end_scope(&mut self) {
        while let Some(resource) = self.scope.pop() {
            drop(resource);
        }
    }

    pub fn into_response_parts(mut self) -> (StatusCode, HeaderMap, Vec<u8>) {
        self.end_scope();
        let output = std::mem::take(&mut self.output);
        let headers = std::mem::take(&mut self.response_headers);
        (self.status, headers, output)
    }
}

impl fmt::Debug for WebiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebiContext")
            .field("method", &self.method)
            .field("request_path", &self.request_path)
            .field("base", &self.base)
            .field("path", &self.path)
            .field("status", &self.status)
            .field("output_len", &self.output.len())
            .finish()
    }
}

impl Drop for WebiContext {
    fn drop(&mut self) {
        self.end_scope();
    }
}
