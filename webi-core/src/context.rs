//! BeanContext - 进程级的 Bean 注册表
//!
//! Bean 按类型注册，也可以额外按字符串 id 注册。注册时立即装配新 Bean 的注入点，
//! 随后为仍未装配完整的 Bean 补齐依赖。装配规则：
//!
//! 1. 先找 id 与字段名相同且类型兼容的 Bean
//! 2. 再找以字段声明类型注册的 Bean
//! 3. 都没有时字段保持未装配；严格模式下 [`BeanContext::inject_all`] 会报错
//!
//! 依赖本身也有注入点时会递归装配，正在装配的对象不会再次进入。
//! 线程作用域 Bean 递归时进入调用线程上的真实实例。

use crate::bean::{Bean, ErasedBean, Injectable, InjectionPoint};
use crate::config::Environment;
use crate::constants::INJECTION_STRICT;
use crate::error::{BeanError, BeanResult};
use crate::thread_local::{ThreadLocalGuard, ThreadLocalWrapper};
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// 注入点无法满足时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionMode {
    /// 保持未装配，只记录日志
    #[default]
    BestEffort,
    /// `inject_all` 返回 [`BeanError::InjectionRequiredMissing`]
    Strict,
}

impl InjectionMode {
    /// 读取 `webi.injection.strict`
    pub fn from_environment(env: &Environment) -> Self {
        if env.get_bool_or(INJECTION_STRICT, false) {
            InjectionMode::Strict
        } else {
            InjectionMode::BestEffort
        }
    }
}

type RealLookup = Arc<dyn Fn() -> Option<Arc<dyn Injectable>> + Send + Sync>;
type Interceptor = Arc<dyn Fn(&ErasedBean) -> Option<ErasedBean> + Send + Sync>;

/// 递归装配时使用的真实对象
#[derive(Clone)]
enum Target {
    Shared(Arc<dyn Injectable>),
    ThreadLocal(RealLookup),
}

impl Target {
    fn real(&self) -> Option<Arc<dyn Injectable>> {
        match self {
            Target::Shared(bean) => Some(Arc::clone(bean)),
            Target::ThreadLocal(lookup) => lookup(),
        }
    }
}

#[derive(Clone)]
struct BeanEntry {
    type_name: &'static str,
    /// 去重用的对象地址
    key: usize,
    /// 对外暴露的句柄（经过拦截器）
    exposed: ErasedBean,
    target: Target,
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, BeanEntry>,
    by_id: HashMap<String, BeanEntry>,
    thread_locals: HashMap<TypeId, ErasedBean>,
}

fn address_of<T: ?Sized>(bean: &Arc<T>) -> usize {
    Arc::as_ptr(bean) as *const () as usize
}

/// Bean 容器
pub struct BeanContext {
    mode: InjectionMode,
    registry: RwLock<Registry>,
    interceptors: RwLock<Vec<Interceptor>>,
    /// 已触发 after_inject 的对象
    ready: Mutex<HashMap<usize, Weak<dyn Injectable>>>,
}

impl BeanContext {
    /// 尽力装配模式
    pub fn new() -> Self {
        Self::with_mode(InjectionMode::BestEffort)
    }

    /// 严格模式
    pub fn strict() -> Self {
        Self::with_mode(InjectionMode::Strict)
    }

    pub fn with_mode(mode: InjectionMode) -> Self {
        Self {
            mode,
            registry: RwLock::new(Registry::default()),
            interceptors: RwLock::new(Vec::new()),
            ready: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> InjectionMode {
        self.mode
    }

    // ========== 注册 ==========

    /// 按具体类型注册
    pub fn add<T: Injectable>(&self, bean: Arc<T>) {
        let real: Arc<dyn Injectable> = bean.clone();
        self.register(None, Bean::Shared(bean), real);
    }

    /// 按 id 和具体类型注册
    pub fn add_named<T: Injectable>(&self, id: impl Into<String>, bean: Arc<T>) {
        let real: Arc<dyn Injectable> = bean.clone();
        self.register(Some(id.into()), Bean::Shared(bean), real);
    }

    /// 以接口类型注册
    ///
    /// `view` 是对外暴露的类型（通常是 `Arc<dyn Trait>`），`real` 是同一个对象的
    /// 可装配视图：
    ///
    /// ```
    /// use std::sync::Arc;
    /// use webi_core::prelude::*;
    ///
    /// trait Clock: Send + Sync {
    ///     fn now(&self) -> u64;
    /// }
    ///
    /// struct FixedClock;
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> u64 { 42 }
    /// }
    /// impl Injectable for FixedClock {}
    ///
    /// let context = BeanContext::new();
    /// let clock = Arc::new(FixedClock);
    /// context.add_as::<dyn Clock>(clock.clone(), clock);
    ///
    /// assert_eq!(context.get::<dyn Clock>().unwrap().get().now(), 42);
    /// ```
    pub fn add_as<I>(&self, view: Arc<I>, real: Arc<dyn Injectable>)
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.register(None, Bean::Shared(view), real);
    }

    /// 以 id 和接口类型注册
    pub fn add_named_as<I>(&self, id: impl Into<String>, view: Arc<I>, real: Arc<dyn Injectable>)
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.register(Some(id.into()), Bean::Shared(view), real);
    }

    fn register<T>(&self, id: Option<String>, bean: Bean<T>, real: Arc<dyn Injectable>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = BeanEntry {
            type_name: type_name::<T>(),
            key: address_of(&real),
            exposed: self.intercept(Arc::new(bean)),
            target: Target::Shared(Arc::clone(&real)),
        };

        {
            let mut registry = self.registry.write();
            if let Some(id) = &id {
                if registry.by_id.insert(id.clone(), entry.clone()).is_some() {
                    tracing::warn!(id = %id, bean = entry.type_name, "Bean id re-registered, previous bean replaced");
                }
            }
            if registry
                .by_type
                .insert(TypeId::of::<T>(), entry.clone())
                .is_some()
            {
                tracing::debug!(bean = entry.type_name, "Bean type re-registered, previous bean replaced");
            }
        }

        tracing::debug!(bean = entry.type_name, id = ?id, "Bean registered");

        real.after_add(self);
        self.inject_best_effort(&real);
        self.backfill();
    }

    /// 添加注入拦截器
    ///
    /// 之后注册的 `T` 类型 Bean 对外暴露的句柄会经过拦截器包装，
    /// 递归装配仍然作用于原始对象。
    pub fn add_inject_interceptor<T, F>(&self, interceptor: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Bean<T>) -> Bean<T> + Send + Sync + 'static,
    {
        let erased: Interceptor = Arc::new(move |handle: &ErasedBean| {
            (**handle)
                .downcast_ref::<Bean<T>>()
                .map(|bean| Arc::new(interceptor(bean.clone())) as ErasedBean)
        });
        self.interceptors.write().push(erased);
    }

    fn intercept(&self, handle: ErasedBean) -> ErasedBean {
        let interceptors = self.interceptors.read().clone();
        interceptors
            .iter()
            .fold(handle, |handle, interceptor| interceptor(&handle).unwrap_or(handle))
    }

    // ========== 线程作用域 ==========

    /// 为调用线程绑定 `T` 的实例
    ///
    /// 第一次调用时创建线程作用域包装并以 `T` 注册，之后只替换调用线程的实例。
    /// 新绑定的实例会立即装配。返回调用线程上被替换的实例。
    pub fn set_thread_local<T: Injectable>(&self, bean: Arc<T>) -> Option<Arc<T>> {
        let (wrapper, created) = self.thread_local_wrapper::<T>();
        let previous = wrapper.set(Arc::clone(&bean));

        if created {
            let lookup_wrapper = Arc::clone(&wrapper);
            let lookup: RealLookup = Arc::new(move || {
                lookup_wrapper
                    .try_current()
                    .ok()
                    .map(|bean| bean as Arc<dyn Injectable>)
            });
            let entry = BeanEntry {
                type_name: type_name::<T>(),
                key: address_of(&wrapper),
                exposed: self.intercept(Arc::new(Bean::ThreadLocal(Arc::clone(&wrapper)))),
                target: Target::ThreadLocal(lookup),
            };
            self.registry.write().by_type.insert(TypeId::of::<T>(), entry);
            tracing::debug!(bean = type_name::<T>(), "Thread-scoped bean registered");
            self.backfill();
        }

        let real: Arc<dyn Injectable> = bean;
        self.inject_best_effort(&real);
        previous
    }

    /// 绑定并返回守卫，守卫 drop 时恢复绑定前的实例
    pub fn bind_thread_local<T: Injectable>(&self, bean: Arc<T>) -> ThreadLocalGuard<T> {
        let previous = self.set_thread_local(bean);
        let (wrapper, _) = self.thread_local_wrapper::<T>();
        ThreadLocalGuard::new(wrapper, previous)
    }

    /// 解除调用线程上 `T` 的绑定
    pub fn clear_thread_local<T: Injectable>(&self) -> Option<Arc<T>> {
        let existing = self
            .registry
            .read()
            .thread_locals
            .get(&TypeId::of::<T>())
            .cloned();
        existing
            .and_then(|wrapper| wrapper.downcast::<ThreadLocalWrapper<T>>().ok())
            .and_then(|wrapper| wrapper.clear())
    }

    fn thread_local_wrapper<T: Injectable>(&self) -> (Arc<ThreadLocalWrapper<T>>, bool) {
        let existing = self
            .registry
            .read()
            .thread_locals
            .get(&TypeId::of::<T>())
            .cloned();
        if let Some(wrapper) = existing.and_then(|w| w.downcast::<ThreadLocalWrapper<T>>().ok()) {
            return (wrapper, false);
        }

        let mut registry = self.registry.write();
        let existing = registry.thread_locals.get(&TypeId::of::<T>()).cloned();
        if let Some(wrapper) = existing.and_then(|w| w.downcast::<ThreadLocalWrapper<T>>().ok()) {
            return (wrapper, false);
        }
        let wrapper = Arc::new(ThreadLocalWrapper::<T>::new());
        registry
            .thread_locals
            .insert(TypeId::of::<T>(), Arc::clone(&wrapper) as ErasedBean);
        (wrapper, true)
    }

    // ========== 查找 ==========

    /// 按类型查找
    pub fn get<T>(&self) -> Option<Bean<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.registry.read().by_type.get(&TypeId::of::<T>()).cloned();
        entry.and_then(|entry| (*entry.exposed).downcast_ref::<Bean<T>>().cloned())
    }

    /// 按 id 查找，类型不符时返回 None
    pub fn get_named<T>(&self, id: &str) -> Option<Bean<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.registry.read().by_id.get(id).cloned();
        entry.and_then(|entry| (*entry.exposed).downcast_ref::<Bean<T>>().cloned())
    }

    /// 按类型查找当前可用的实例
    pub fn instance<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().and_then(|bean| bean.try_get().ok())
    }

    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry.read().by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn contains_named(&self, id: &str) -> bool {
        self.registry.read().by_id.contains_key(id)
    }

    /// 所有 id，已排序
    pub fn bean_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().by_id.keys().cloned().collect();
        names.sort();
        names
    }

    // ========== 装配 ==========

    /// 重新装配所有已注册的 Bean
    ///
    /// 严格模式下遇到无法满足的注入点立即返回错误，适合在启动完成前调用一次。
    pub fn inject_all(&self) -> BeanResult<()> {
        let strict = self.mode == InjectionMode::Strict;
        let targets = self.targets();
        let mut incomplete = 0usize;

        for target in &targets {
            let mut in_progress = HashSet::new();
            if !self.inject_into(target, strict, &mut in_progress)? {
                incomplete += 1;
            }
        }

        tracing::info!(
            beans = targets.len(),
            incomplete = incomplete,
            mode = ?self.mode,
            "Bean injection pass completed"
        );
        Ok(())
    }

    /// 装配一个对象，返回是否所有注入点都已满足
    ///
    /// 对象不需要注册到容器中，适合请求期间创建的临时对象。
    pub fn inject<T: Injectable>(&self, bean: &Arc<T>) -> BeanResult<bool> {
        let target: Arc<dyn Injectable> = bean.clone();
        let mut in_progress = HashSet::new();
        self.inject_into(&target, self.mode == InjectionMode::Strict, &mut in_progress)
    }

    fn inject_best_effort(&self, target: &Arc<dyn Injectable>) {
        let mut in_progress = HashSet::new();
        if let Err(e) = self.inject_into(target, false, &mut in_progress) {
            tracing::warn!(bean = target.bean_name(), error = %e, "Injection failed");
        }
    }

    /// 为仍未装配完整的 Bean 补齐依赖
    fn backfill(&self) {
        for target in self.targets() {
            if !self.is_ready(&target) {
                self.inject_best_effort(&target);
            }
        }
    }

    fn targets(&self) -> Vec<Arc<dyn Injectable>> {
        let entries: Vec<BeanEntry> = {
            let registry = self.registry.read();
            let mut seen = HashSet::new();
            registry
                .by_type
                .values()
                .chain(registry.by_id.values())
                .filter(|entry| seen.insert(entry.key))
                .cloned()
                .collect()
        };
        entries.iter().filter_map(|entry| entry.target.real()).collect()
    }

    fn inject_into(
        &self,
        target: &Arc<dyn Injectable>,
        strict: bool,
        in_progress: &mut HashSet<usize>,
    ) -> BeanResult<bool> {
        let key = address_of(target);
        if !in_progress.insert(key) {
            return Ok(self.is_ready(target));
        }
        let result = self.inject_points(target, strict, in_progress);
        in_progress.remove(&key);

        let complete = result?;
        if complete {
            self.mark_ready(target);
        }
        Ok(complete)
    }

    fn inject_points(
        &self,
        target: &Arc<dyn Injectable>,
        strict: bool,
        in_progress: &mut HashSet<usize>,
    ) -> BeanResult<bool> {
        let owner = target.bean_name();
        let mut complete = true;

        for point in target.injection_points() {
            let resolved = self.resolve(point);

            if !point.is_set() {
                match &resolved {
                    Some(entry) if point.assign(&entry.exposed) => {
                        tracing::trace!(
                            bean = owner,
                            field = point.name(),
                            dependency = entry.type_name,
                            "Injected field"
                        );
                    }
                    _ => {
                        complete = false;
                        if strict {
                            return Err(BeanError::InjectionRequiredMissing {
                                owner: owner.to_string(),
                                field: point.name().to_string(),
                                type_name: point.type_name().to_string(),
                            });
                        }
                        tracing::debug!(
                            bean = owner,
                            field = point.name(),
                            dependency = point.type_name(),
                            "No bean available for field, left unset"
                        );
                        continue;
                    }
                }
            }

            let real = resolved.and_then(|entry| entry.target.real());
            if let Some(real) = real {
                if !real.injection_points().is_empty() && !in_progress.contains(&address_of(&real)) {
                    self.inject_into(&real, strict, in_progress)?;
                }
            }
        }

        Ok(complete)
    }

    fn resolve(&self, point: &dyn InjectionPoint) -> Option<BeanEntry> {
        let registry = self.registry.read();
        registry
            .by_id
            .get(point.name())
            .filter(|entry| point.accepts(&entry.exposed))
            .or_else(|| {
                registry
                    .by_type
                    .get(&point.declared_type())
                    .filter(|entry| point.accepts(&entry.exposed))
            })
            .cloned()
    }

    fn is_ready(&self, target: &Arc<dyn Injectable>) -> bool {
        self.ready
            .lock()
            .get(&address_of(target))
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn mark_ready(&self, target: &Arc<dyn Injectable>) {
        let fire = {
            let mut ready = self.ready.lock();
            let key = address_of(target);
            let already = ready
                .get(&key)
                .is_some_and(|weak| weak.strong_count() > 0);
            if !already {
                ready.retain(|_, weak| weak.strong_count() > 0);
                ready.insert(key, Arc::downgrade(target));
            }
            !already
        };

        if fire {
            tracing::debug!(bean = target.bean_name(), "All fields injected");
            target.after_inject();
        }
    }
}

impl Default for BeanContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BeanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("BeanContext")
            .field("mode", &self.mode)
            .field("types", &registry.by_type.len())
            .field("ids", &registry.by_id.len())
            .field("thread_locals", &registry.thread_locals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::Inject;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    trait Store: Send + Sync {
        fn label(&self) -> String;
    }

    struct MemoryStore(&'static str);

    impl Store for MemoryStore {
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    impl Injectable for MemoryStore {}

    struct Repository {
        store: Inject<dyn Store>,
    }

    impl Repository {
        fn new() -> Self {
            Self {
                store: Inject::new("store"),
            }
        }
    }

    impl Injectable for Repository {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.store]
        }
    }

    struct Service {
        repository: Inject<Repository>,
        ready_calls: AtomicUsize,
        added_calls: AtomicUsize,
    }

    impl Service {
        fn new() -> Self {
            Self {
                repository: Inject::new("repository"),
                ready_calls: AtomicUsize::new(0),
                added_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Injectable for Service {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.repository]
        }

        fn after_add(&self, _context: &BeanContext) {
            self.added_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn after_inject(&self) {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_mode_from_environment() {
        use crate::config::MapPropertySource;

        let env = Environment::new();
        assert_eq!(InjectionMode::from_environment(&env), InjectionMode::BestEffort);
        env.add_property_source(Box::new(
            MapPropertySource::new("test").with_property(INJECTION_STRICT, true),
        ));
        assert_eq!(InjectionMode::from_environment(&env), InjectionMode::Strict);
    }

    #[test]
    fn test_register_and_get() {
        let context = BeanContext::new();
        let store = Arc::new(MemoryStore("main"));
        context.add_named("mainStore", Arc::clone(&store));

        assert!(context.contains::<MemoryStore>());
        assert!(context.contains_named("mainStore"));
        assert_eq!(context.instance::<MemoryStore>().unwrap().0, "main");
        assert_eq!(context.get_named::<MemoryStore>("mainStore").unwrap().get().0, "main");
        assert!(context.get_named::<Repository>("mainStore").is_none());
        assert!(context.get::<Repository>().is_none());
        assert_eq!(context.bean_names(), vec!["mainStore".to_string()]);
    }

    #[test]
    fn test_name_takes_precedence_over_type() {
        let context = BeanContext::new();
        let by_type = Arc::new(MemoryStore("by-type"));
        let by_name = Arc::new(MemoryStore("by-name"));
        context.add_as::<dyn Store>(by_type.clone(), by_type);
        context.add_named_as::<dyn Store>("store", by_name.clone(), by_name);

        let repository = Arc::new(Repository::new());
        context.add(Arc::clone(&repository));

        assert_eq!(repository.store.require().unwrap().label(), "by-name");
    }

    #[test]
    fn test_name_match_with_incompatible_type_falls_back_to_type() {
        let context = BeanContext::new();
        // "store" id is taken by a bean of an unrelated type
        context.add_named("store", Arc::new(Service::new()));
        let store = Arc::new(MemoryStore("typed"));
        context.add_as::<dyn Store>(store.clone(), store);

        let repository = Arc::new(Repository::new());
        context.add(Arc::clone(&repository));

        assert_eq!(repository.store.require().unwrap().label(), "typed");
    }

    #[test]
    fn test_backfill_and_ready_fires_once() {
        let context = BeanContext::new();
        let service = Arc::new(Service::new());
        context.add(Arc::clone(&service));

        assert_eq!(service.added_calls.load(Ordering::SeqCst), 1);
        assert!(!service.repository.is_wired());
        assert_eq!(service.ready_calls.load(Ordering::SeqCst), 0);

        let repository = Arc::new(Repository::new());
        context.add(Arc::clone(&repository));
        assert!(service.repository.is_wired());
        assert_eq!(service.ready_calls.load(Ordering::SeqCst), 1);

        let store = Arc::new(MemoryStore("late"));
        context.add_as::<dyn Store>(store.clone(), store);
        assert!(repository.store.is_wired());

        context.inject_all().unwrap();
        context.inject_all().unwrap();
        assert_eq!(service.ready_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_injection_is_idempotent() {
        let context = BeanContext::new();
        let store = Arc::new(MemoryStore("one"));
        context.add_as::<dyn Store>(store.clone(), store);
        let repository = Arc::new(Repository::new());
        context.add(Arc::clone(&repository));
        let service = Arc::new(Service::new());
        context.add(Arc::clone(&service));

        let first_repository = service.repository.bean().unwrap();
        let first_store = repository.store.bean().unwrap();

        // a different store registered later must not replace an already wired field
        let other = Arc::new(MemoryStore("two"));
        context.add_as::<dyn Store>(other.clone(), other);
        context.inject_all().unwrap();
        assert!(context.inject(&service).unwrap());

        assert!(service.repository.bean().unwrap().same_as(&first_repository));
        assert!(repository.store.bean().unwrap().same_as(&first_store));
        assert_eq!(repository.store.require().unwrap().label(), "one");
    }

    struct Left {
        right: Inject<Right>,
    }

    struct Right {
        left: Inject<Left>,
    }

    impl Injectable for Left {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.right]
        }
    }

    impl Injectable for Right {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.left]
        }
    }

    #[test]
    fn test_cycles_terminate() {
        let context = BeanContext::new();
        let left = Arc::new(Left {
            right: Inject::new("right"),
        });
        let right = Arc::new(Right {
            left: Inject::new("left"),
        });
        context.add(Arc::clone(&left));
        context.add(Arc::clone(&right));
        context.inject_all().unwrap();

        assert!(left.right.is_wired());
        assert!(right.left.is_wired());
    }

    #[test]
    fn test_strict_mode_reports_missing_field() {
        let context = BeanContext::strict();
        context.add(Arc::new(Service::new()));

        match context.inject_all() {
            Err(BeanError::InjectionRequiredMissing { field, type_name, .. }) => {
                assert_eq!(field, "repository");
                assert!(type_name.ends_with("Repository"));
            }
            other => panic!("expected missing injection error, got {:?}", other),
        }

        let repository = Arc::new(Repository::new());
        context.add(repository);
        let store = Arc::new(MemoryStore("s"));
        context.add_as::<dyn Store>(store.clone(), store);
        assert!(context.inject_all().is_ok());
    }

    #[test]
    fn test_interceptor_wraps_exposed_handle() {
        struct Loud(Arc<dyn Store>);
        impl Store for Loud {
            fn label(&self) -> String {
                self.0.label().to_uppercase()
            }
        }

        let context = BeanContext::new();
        context.add_inject_interceptor::<dyn Store, _>(|bean| {
            let wrapped: Arc<dyn Store> = Arc::new(Loud(bean.get()));
            Bean::Shared(wrapped)
        });
        let store = Arc::new(MemoryStore("quiet"));
        context.add_as::<dyn Store>(store.clone(), store);

        let repository = Arc::new(Repository::new());
        context.add(Arc::clone(&repository));
        assert_eq!(repository.store.require().unwrap().label(), "QUIET");
    }

    struct Session {
        user: &'static str,
        store: Inject<dyn Store>,
    }

    impl Injectable for Session {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.store]
        }
    }

    struct Greeter {
        session: Inject<Session>,
    }

    impl Injectable for Greeter {
        fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
            vec![&self.session]
        }
    }

    fn session(user: &'static str) -> Arc<Session> {
        Arc::new(Session {
            user,
            store: Inject::new("store"),
        })
    }

    #[test]
    fn test_thread_local_bean_is_injected_as_proxy() {
        let context = Arc::new(BeanContext::new());
        let greeter = Arc::new(Greeter {
            session: Inject::new("session"),
        });
        context.add(Arc::clone(&greeter));
        let store = Arc::new(MemoryStore("shared"));
        context.add_as::<dyn Store>(store.clone(), store);

        let bound = session("main");
        context.set_thread_local(Arc::clone(&bound));

        let handle = greeter.session.bean().unwrap();
        assert!(handle.is_thread_local());
        assert_eq!(handle.get().user, "main");
        // the real instance got its own fields wired
        assert_eq!(bound.store.require().unwrap().label(), "shared");

        let barrier = Arc::new(Barrier::new(2));
        let workers: Vec<_> = ["t1", "t2"]
            .into_iter()
            .map(|user| {
                let context = Arc::clone(&context);
                let greeter = Arc::clone(&greeter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let _guard = context.bind_thread_local(session(user));
                    barrier.wait();
                    for _ in 0..50 {
                        assert_eq!(greeter.session.require().unwrap().user, user);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handle.get().user, "main");
        assert!(context.clear_thread_local::<Session>().is_some());
        assert!(handle.try_get().is_err());
        assert!(greeter.session.get().is_none());
    }

    #[test]
    #[should_panic(expected = "has no instance bound")]
    fn test_unbound_thread_local_use_panics() {
        let context = BeanContext::new();
        context.set_thread_local(session("gone"));
        context.clear_thread_local::<Session>();
        let _ = context.get::<Session>().unwrap().get();
    }

    #[test]
    fn test_inner_binding_restores_outer_on_drop() {
        let context = BeanContext::new();
        let outer = context.bind_thread_local(session("outer"));
        {
            let _inner = context.bind_thread_local(session("inner"));
            assert_eq!(context.instance::<Session>().unwrap().user, "inner");
        }
        assert_eq!(context.instance::<Session>().unwrap().user, "outer");

        drop(outer);
        assert!(context.instance::<Session>().is_none());
    }
}
