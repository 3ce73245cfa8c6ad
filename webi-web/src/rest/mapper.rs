//! URL 映射
//!
//! 控制器在注册时被展开为 `base URL -> method URL -> 动词 -> 操作` 的三级表。
//! 请求时按路径段匹配：先取最长的 base URL，再取其下最长的 method URL，
//! 剩余的路径段作为位置参数交给 PATH 参数。

use super::controller::{ControllerMapping, RestController};
use super::descriptor::{ModelDescriptor, OperationDescriptor};
use http::Method;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use webi_core::Injectable;

type VerbTable = HashMap<Method, Arc<OperationDescriptor>>;

/// 类型擦除后的控制器实例
pub type ControllerInstance = Arc<dyn Any + Send + Sync>;

struct ControllerEntry {
    instance: ControllerInstance,
    type_name: &'static str,
}

#[derive(Default)]
struct Table {
    methods: BTreeMap<String, BTreeMap<String, VerbTable>>,
    controllers: HashMap<String, ControllerEntry>,
    models: BTreeMap<&'static str, Arc<ModelDescriptor>>,
}

/// 解析结果
#[derive(Clone)]
pub struct ResolvedOperation {
    pub operation: Arc<OperationDescriptor>,
    pub controller: ControllerInstance,
    /// 操作路径之后的路径段
    pub path_params: Vec<String>,
}

impl std::fmt::Debug for ResolvedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOperation")
            .field("operation", &self.operation)
            .field("path_params", &self.path_params)
            .finish()
    }
}

/// 操作分发表
///
/// 同一个 `(base URL, method URL, 动词)` 注册多次时，后注册的操作覆盖之前的，
/// 同时记录一条警告。同一个 base URL 再次暴露控制器时，新控制器整体替换旧控制器：
/// 旧控制器的操作一并移除，解析结果中的操作总是属于返回的控制器实例。
#[derive(Default)]
pub struct UrlMapper {
    table: RwLock<Table>,
}

impl Injectable for UrlMapper {}

impl UrlMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以控制器声明的 base URL（默认为小写的类型名）暴露控制器，返回实际 base URL
    pub fn expose<C: RestController>(&self, controller: Arc<C>) -> String {
        let mapping = ControllerMapping::<C>::collect(None);
        self.install(controller, mapping)
    }

    /// 以指定 base URL 暴露控制器，覆盖控制器自己声明的路径
    pub fn expose_at<C: RestController>(&self, controller: Arc<C>, base_url: &str) -> String {
        let mapping = ControllerMapping::<C>::collect(Some(base_url));
        self.install(controller, mapping)
    }

    fn install<C: RestController>(&self, controller: Arc<C>, mapping: ControllerMapping<C>) -> String {
        let (base_url, operations, models) = mapping.into_operations();
        let type_name = std::any::type_name::<C>();

        let mut table = self.table.write();
        if let Some(previous) = table.controllers.remove(&base_url) {
            // 旧控制器的操作只能在旧实例上调用
            let dropped = table.methods.remove(&base_url).map_or(0, |methods| methods.len());
            tracing::warn!(
                base_url = %base_url,
                previous = previous.type_name,
                controller = type_name,
                dropped,
                "Controller replaced, previous operations removed"
            );
        }
        for model in models {
            table.models.insert(model.name(), Arc::new(model));
        }
        for operation in operations {
            let verbs = table
                .methods
                .entry(base_url.clone())
                .or_default()
                .entry(operation.method_url.clone())
                .or_default();
            let verb = operation.verb.clone();
            let url = operation.url();
            if let Some(previous) = verbs.insert(verb.clone(), Arc::new(operation)) {
                tracing::warn!(
                    url = %url,
                    verb = %verb,
                    previous = previous.owner_type(),
                    "Operation registered twice, the later registration wins"
                );
            } else {
                tracing::debug!(url = %url, verb = %verb, "Operation mapped");
            }
        }

        let instance: ControllerInstance = controller;
        table
            .controllers
            .insert(base_url.clone(), ControllerEntry { instance, type_name });
        tracing::info!(base_url = %base_url, controller = type_name, "Controller exposed");
        base_url
    }

    /// 按路径（已去掉处理器前缀）和动词解析操作
    pub fn resolve(&self, path: &str, verb: &Method) -> Option<ResolvedOperation> {
        let parts: Vec<&str> = segments(path).collect();
        let table = self.table.read();

        let mut bases: Vec<(&String, &BTreeMap<String, VerbTable>)> = table
            .methods
            .iter()
            .filter(|(base, _)| starts_with_segments(&parts, base))
            .collect();
        // 最长的 base URL 优先
        bases.sort_by_key(|(base, _)| std::cmp::Reverse(segments(base).count()));

        for (base, methods) in bases {
            let rest = &parts[segments(base).count()..];
            let matched = methods
                .iter()
                .filter(|(method_url, verbs)| {
                    verbs.contains_key(verb) && starts_with_segments(rest, method_url)
                })
                .max_by_key(|(method_url, _)| segments(method_url).count());

            if let Some((method_url, verbs)) = matched {
                let controller = table.controllers.get(base.as_str())?;
                let operation = verbs.get(verb)?;
                let consumed = segments(method_url).count();
                return Some(ResolvedOperation {
                    operation: Arc::clone(operation),
                    controller: Arc::clone(&controller.instance),
                    path_params: rest[consumed..].iter().map(|s| s.to_string()).collect(),
                });
            }
        }
        None
    }

    /// base URL 上的控制器
    pub fn instance_for(&self, base_url: &str) -> Option<ControllerInstance> {
        self.table
            .read()
            .controllers
            .get(normalize(base_url).as_str())
            .map(|entry| Arc::clone(&entry.instance))
    }

    /// base URL 上控制器的类型名
    pub fn controller_type(&self, base_url: &str) -> Option<&'static str> {
        self.table
            .read()
            .controllers
            .get(normalize(base_url).as_str())
            .map(|entry| entry.type_name)
    }

    /// 控制器声明的模型
    pub fn model(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.table.read().models.get(name).cloned()
    }

    /// 所有 base URL，已排序
    pub fn base_urls(&self) -> Vec<String> {
        self.table.read().methods.keys().cloned().collect()
    }

    /// 每个 base URL 下的操作，按 method URL 和动词排序
    pub fn methods(&self) -> BTreeMap<String, Vec<Arc<OperationDescriptor>>> {
        let table = self.table.read();
        table
            .methods
            .iter()
            .map(|(base, methods)| {
                let mut operations: Vec<Arc<OperationDescriptor>> = methods
                    .values()
                    .flat_map(|verbs| verbs.values().cloned())
                    .collect();
                operations.sort_by(|a, b| {
                    (a.method_url(), a.verb().as_str()).cmp(&(b.method_url(), b.verb().as_str()))
                });
                (base.clone(), operations)
            })
            .collect()
    }
}

impl std::fmt::Debug for UrlMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlMapper")
            .field("base_urls", &self.base_urls())
            .finish()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn starts_with_segments(path: &[&str], prefix: &str) -> bool {
    segments(prefix)
        .enumerate()
        .all(|(index, segment)| path.get(index) == Some(&segment))
}

/// 去掉首尾的 `/`
pub(crate) fn normalize(url: &str) -> String {
    segments(url).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::descriptor::{ParamType, ParameterDescriptor};
    use crate::rest::invocation::Invocation;

    struct Hallo;

    impl Injectable for Hallo {}

    impl RestController for Hallo {
        fn map(mapping: &mut ControllerMapping<Self>) {
            mapping
                .operation("world", |_, _| Ok("world"))
                .returns(ParamType::String);
            mapping
                .operation("save", |_, _| Ok(()))
                .verb(Method::POST)
                .path("world");
            mapping
                .operation("item", |_, invocation: &mut Invocation<'_>| invocation.arg::<i64>("id"))
                .path("items/get")
                .param(ParameterDescriptor::path("id", ParamType::Int));
            mapping.operation("items", |_, _| Ok(Vec::<i64>::new()));
        }
    }

    struct Nested;

    impl Injectable for Nested {}

    impl RestController for Nested {
        fn map(mapping: &mut ControllerMapping<Self>) {
            mapping.path("hallo/admin");
            mapping.operation("stats", |_, _| Ok(1));
        }
    }

    #[test]
    fn test_default_urls_and_verbs() {
        let mapper = UrlMapper::new();
        assert_eq!(mapper.expose(Arc::new(Hallo)), "hallo");

        let get = mapper.resolve("/hallo/world/", &Method::GET).unwrap();
        assert_eq!(get.operation.name(), "world");
        assert!(get.path_params.is_empty());

        let post = mapper.resolve("/hallo/world", &Method::POST).unwrap();
        assert_eq!(post.operation.name(), "save");

        assert!(mapper.resolve("/hallo/world", &Method::DELETE).is_none());
        assert!(mapper.resolve("/hallo/unknown", &Method::GET).is_none());
        assert!(mapper.resolve("/other/world", &Method::GET).is_none());
    }

    #[test]
    fn test_longest_method_url_and_path_params() {
        let mapper = UrlMapper::new();
        mapper.expose(Arc::new(Hallo));

        let resolved = mapper.resolve("/hallo/items/get/42/extra", &Method::GET).unwrap();
        assert_eq!(resolved.operation.name(), "item");
        assert_eq!(resolved.path_params, vec!["42".to_string(), "extra".to_string()]);

        let resolved = mapper.resolve("/hallo/items/7", &Method::GET).unwrap();
        assert_eq!(resolved.operation.name(), "items");
        assert_eq!(resolved.path_params, vec!["7".to_string()]);
    }

    #[test]
    fn test_longest_base_url() {
        let mapper = UrlMapper::new();
        mapper.expose(Arc::new(Hallo));
        mapper.expose(Arc::new(Nested));

        let resolved = mapper.resolve("/hallo/admin/stats", &Method::GET).unwrap();
        assert_eq!(resolved.operation.owner_type(), std::any::type_name::<Nested>());
        assert!(resolved.controller.downcast_ref::<Nested>().is_some());

        let resolved = mapper.resolve("/hallo/world", &Method::GET).unwrap();
        assert!(resolved.controller.downcast_ref::<Hallo>().is_some());
    }

    #[test]
    fn test_expose_at_and_duplicates() {
        let mapper = UrlMapper::new();
        assert_eq!(mapper.expose_at(Arc::new(Hallo), "/greetings/"), "greetings");
        mapper.expose_at(Arc::new(Hallo), "greetings");

        assert_eq!(mapper.base_urls(), vec!["greetings".to_string()]);
        assert!(mapper.instance_for("/greetings").is_some());
        assert_eq!(mapper.controller_type("greetings"), Some(std::any::type_name::<Hallo>()));

        let methods = mapper.methods();
        let names: Vec<&str> = methods["greetings"].iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["items", "item", "world", "save"]);
    }

    struct Other;

    impl Injectable for Other {}

    impl RestController for Other {
        fn map(mapping: &mut ControllerMapping<Self>) {
            mapping.operation("ping", |_, _| Ok("pong"));
        }
    }

    #[test]
    fn test_replacing_controller_drops_its_operations() {
        let mapper = UrlMapper::new();
        mapper.expose_at(Arc::new(Hallo), "shared");
        mapper.expose_at(Arc::new(Other), "shared");

        assert!(mapper.resolve("/shared/world", &Method::GET).is_none());
        assert!(mapper.resolve("/shared/items", &Method::GET).is_none());

        let resolved = mapper.resolve("/shared/ping", &Method::GET).unwrap();
        assert_eq!(resolved.operation.owner_type(), std::any::type_name::<Other>());
        assert!(resolved.controller.downcast_ref::<Other>().is_some());

        let methods = mapper.methods();
        let names: Vec<&str> = methods["shared"].iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["ping"]);
        assert_eq!(mapper.controller_type("shared"), Some(std::any::type_name::<Other>()));
    }
}
