//! Bean 与注入点
//!
//! 容器不依赖反射：每个可注入的对象实现 [`Injectable`]，通过
//! [`Injectable::injection_points`] 显式列出自己的 [`Inject`] 字段。
//! 容器按「先名称、后类型」的顺序为这些字段找到依赖并写入。

use crate::context::BeanContext;
use crate::error::{BeanError, BeanResult};
use crate::thread_local::ThreadLocalWrapper;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的 Bean 句柄，内部总是一个 `Bean<T>`
pub type ErasedBean = Arc<dyn Any + Send + Sync>;

/// 可被容器装配的对象
///
/// # 示例
///
/// ```
/// use std::sync::Arc;
/// use webi_core::prelude::*;
///
/// struct Repository;
/// impl Injectable for Repository {}
///
/// struct Service {
///     repository: Inject<Repository>,
/// }
///
/// impl Injectable for Service {
///     fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
///         vec![&self.repository]
///     }
/// }
///
/// let context = BeanContext::new();
/// let service = Arc::new(Service { repository: Inject::new("repository") });
/// context.add(Arc::clone(&service));
/// context.add(Arc::new(Repository));
///
/// assert!(service.repository.is_wired());
/// ```
pub trait Injectable: Any + Send + Sync {
    /// 声明的注入点，按声明顺序
    fn injection_points(&self) -> Vec<&dyn InjectionPoint> {
        Vec::new()
    }

    /// 注册到容器后立即调用
    fn after_add(&self, _context: &BeanContext) {}

    /// 所有注入点都装配完成后调用，每个对象只触发一次
    fn after_inject(&self) {}

    /// 用于日志和错误信息的名称
    fn bean_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 注入点的类型擦除视图
pub trait InjectionPoint: Send + Sync {
    /// 字段名，按名称解析时使用
    fn name(&self) -> &str;

    /// 声明的依赖类型
    fn declared_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    fn is_set(&self) -> bool;

    /// 句柄是否与声明类型兼容
    fn accepts(&self, handle: &ErasedBean) -> bool;

    /// 写入句柄，类型不兼容时返回 false
    fn assign(&self, handle: &ErasedBean) -> bool;
}

/// 对 Bean 的引用
///
/// 调用方不需要关心它是普通单例还是线程作用域 Bean：两者都通过
/// [`Bean::get`] 取得当前可用的实例。
pub enum Bean<T: ?Sized + Send + Sync + 'static> {
    /// 进程内共享的单例
    Shared(Arc<T>),
    /// 线程作用域，每次访问都转发到调用线程绑定的实例
    ThreadLocal(Arc<ThreadLocalWrapper<T>>),
}

impl<T: ?Sized + Send + Sync + 'static> Bean<T> {
    /// 当前实例
    ///
    /// # Panics
    ///
    /// 线程作用域 Bean 在调用线程没有绑定实例时 panic，这说明请求作用域的
    /// Bean 在请求之外被使用了。
    pub fn get(&self) -> Arc<T> {
        match self {
            Bean::Shared(bean) => Arc::clone(bean),
            Bean::ThreadLocal(wrapper) => wrapper.current(),
        }
    }

    /// 与 [`Bean::get`] 相同，但未绑定时返回错误
    pub fn try_get(&self) -> BeanResult<Arc<T>> {
        match self {
            Bean::Shared(bean) => Ok(Arc::clone(bean)),
            Bean::ThreadLocal(wrapper) => wrapper.try_current(),
        }
    }

    pub fn is_thread_local(&self) -> bool {
        matches!(self, Bean::ThreadLocal(_))
    }

    /// 两个句柄是否指向同一个底层对象（或同一个线程作用域包装）
    pub fn same_as(&self, other: &Bean<T>) -> bool {
        match (self, other) {
            (Bean::Shared(a), Bean::Shared(b)) => Arc::ptr_eq(a, b),
            (Bean::ThreadLocal(a), Bean::ThreadLocal(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Bean<T> {
    fn clone(&self) -> Self {
        match self {
            Bean::Shared(bean) => Bean::Shared(Arc::clone(bean)),
            Bean::ThreadLocal(wrapper) => Bean::ThreadLocal(Arc::clone(wrapper)),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Arc<T>> for Bean<T> {
    fn from(bean: Arc<T>) -> Self {
        Bean::Shared(bean)
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Bean<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_thread_local() { "thread-local" } else { "shared" };
        f.debug_struct("Bean")
            .field("type", &std::any::type_name::<T>())
            .field("scope", &kind)
            .finish()
    }
}

/// 可注入字段
///
/// 字段名决定按名称解析时查找的 Bean id，`T` 决定按类型解析时的类型，
/// 可以是具体类型，也可以是 `dyn Trait`。
pub struct Inject<T: ?Sized + Send + Sync + 'static> {
    name: String,
    slot: RwLock<Option<Bean<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> Inject<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: RwLock::new(None),
        }
    }

    /// 手动装配
    pub fn set(&self, bean: impl Into<Bean<T>>) {
        *self.slot.write() = Some(bean.into());
    }

    pub fn is_wired(&self) -> bool {
        self.slot.read().is_some()
    }

    /// 已装配的句柄
    pub fn bean(&self) -> Option<Bean<T>> {
        self.slot.read().clone()
    }

    /// 已装配且可用的实例
    pub fn get(&self) -> Option<Arc<T>> {
        self.bean().and_then(|bean| bean.try_get().ok())
    }

    pub fn require(&self) -> BeanResult<Arc<T>> {
        match self.bean() {
            Some(bean) => bean.try_get(),
            None => Err(BeanError::NotWired {
                field: self.name.clone(),
                type_name: std::any::type_name::<T>().to_string(),
            }),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> InjectionPoint for Inject<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn is_set(&self) -> bool {
        self.is_wired()
    }

    fn accepts(&self, handle: &ErasedBean) -> bool {
        (**handle).is::<Bean<T>>()
    }

    fn assign(&self, handle: &ErasedBean) -> bool {
        match (**handle).downcast_ref::<Bean<T>>() {
            Some(bean) => {
                *self.slot.write() = Some(bean.clone());
                true
            }
            None => false,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .field("wired", &self.is_wired())
            .finish()
    }
}
