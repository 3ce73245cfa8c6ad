//! 线程作用域 Bean
//!
//! [`ThreadLocalWrapper`] 为每个工作线程保存一个实例。对外暴露的
//! [`Bean::ThreadLocal`](crate::bean::Bean) 句柄在每次访问时转发到调用线程当前绑定的实例。

use crate::error::{BeanError, BeanResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// 按线程保存 Bean 实例
pub struct ThreadLocalWrapper<T: ?Sized + Send + Sync + 'static> {
    slots: RwLock<HashMap<ThreadId, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> ThreadLocalWrapper<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// 为调用线程绑定实例，返回被替换的旧实例
    pub fn set(&self, bean: Arc<T>) -> Option<Arc<T>> {
        self.slots.write().insert(thread::current().id(), bean)
    }

    /// 解除调用线程的绑定
    pub fn clear(&self) -> Option<Arc<T>> {
        self.clear_for(thread::current().id())
    }

    pub(crate) fn clear_for(&self, thread: ThreadId) -> Option<Arc<T>> {
        self.slots.write().remove(&thread)
    }

    pub(crate) fn set_for(&self, thread: ThreadId, bean: Arc<T>) -> Option<Arc<T>> {
        self.slots.write().insert(thread, bean)
    }

    pub fn is_bound(&self) -> bool {
        self.slots.read().contains_key(&thread::current().id())
    }

    /// 当前持有绑定的线程数
    pub fn bound_threads(&self) -> usize {
        self.slots.read().len()
    }

    pub fn try_current(&self) -> BeanResult<Arc<T>> {
        let current = thread::current();
        self.slots
            .read()
            .get(&current.id())
            .cloned()
            .ok_or_else(|| BeanError::ThreadLocalUnbound {
                type_name: std::any::type_name::<T>().to_string(),
                thread: current
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:?}", current.id())),
            })
    }

    /// 调用线程绑定的实例
    ///
    /// # Panics
    ///
    /// 调用线程没有绑定实例时 panic。
    pub fn current(&self) -> Arc<T> {
        match self.try_current() {
            Ok(bean) => bean,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for ThreadLocalWrapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for ThreadLocalWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalWrapper")
            .field("type", &std::any::type_name::<T>())
            .field("bound_threads", &self.bound_threads())
            .finish()
    }
}

/// 绑定守卫
///
/// drop 时恢复创建线程上被这次绑定替换的实例，没有旧实例时解除绑定。
/// 同一线程上的嵌套绑定因此按相反顺序逐层还原。
#[must_use = "the binding is cleared as soon as the guard is dropped"]
pub struct ThreadLocalGuard<T: ?Sized + Send + Sync + 'static> {
    wrapper: Arc<ThreadLocalWrapper<T>>,
    thread: ThreadId,
    previous: Option<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ThreadLocalGuard<T> {
    /// `previous` 为绑定前调用线程上的实例
    pub(crate) fn new(wrapper: Arc<ThreadLocalWrapper<T>>, previous: Option<Arc<T>>) -> Self {
        Self {
            wrapper,
            thread: thread::current().id(),
            previous,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Drop for ThreadLocalGuard<T> {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.wrapper.set_for(self.thread, previous);
                tracing::trace!(
                    bean = std::any::type_name::<T>(),
                    thread = ?self.thread,
                    "Thread-scoped binding restored"
                );
            }
            None => {
                self.wrapper.clear_for(self.thread);
                tracing::trace!(
                    bean = std::any::type_name::<T>(),
                    thread = ?self.thread,
                    "Thread-scoped binding cleared"
                );
            }
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for ThreadLocalGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalGuard")
            .field("type", &std::any::type_name::<T>())
            .field("thread", &self.thread)
            .field("restores", &self.previous.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[derive(Debug, PartialEq)]
    struct Session(&'static str);

    #[test]
    fn test_threads_observe_their_own_instance() {
        let wrapper = Arc::new(ThreadLocalWrapper::<Session>::new());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let wrapper = Arc::clone(&wrapper);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    wrapper.set(Arc::new(Session(name)));
                    // both threads are bound before either reads
                    barrier.wait();
                    for _ in 0..100 {
                        assert_eq!(wrapper.current().0, name);
                    }
                    wrapper.clear();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(wrapper.bound_threads(), 0);
    }

    #[test]
    fn test_rebinding_replaces_only_current_thread() {
        let wrapper = ThreadLocalWrapper::<Session>::new();
        assert!(wrapper.set(Arc::new(Session("first"))).is_none());
        let previous = wrapper.set(Arc::new(Session("second"))).unwrap();
        assert_eq!(previous.0, "first");
        assert_eq!(wrapper.current().0, "second");
        assert_eq!(wrapper.bound_threads(), 1);
    }

    #[test]
    fn test_unbound_access_is_an_error() {
        let wrapper = ThreadLocalWrapper::<Session>::new();
        assert!(!wrapper.is_bound());
        assert!(matches!(
            wrapper.try_current(),
            Err(BeanError::ThreadLocalUnbound { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "has no instance bound")]
    fn test_unbound_current_panics() {
        let wrapper = ThreadLocalWrapper::<Session>::new();
        let _ = wrapper.current();
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let wrapper = Arc::new(ThreadLocalWrapper::<Session>::new());
        wrapper.set(Arc::new(Session("scoped")));
        {
            let _guard = ThreadLocalGuard::new(Arc::clone(&wrapper), None);
            assert!(wrapper.is_bound());
        }
        assert!(!wrapper.is_bound());
    }

    #[test]
    fn test_nested_guards_restore_outer_binding() {
        let wrapper = Arc::new(ThreadLocalWrapper::<Session>::new());

        let outer = {
            let previous = wrapper.set(Arc::new(Session("outer")));
            ThreadLocalGuard::new(Arc::clone(&wrapper), previous)
        };
        {
            let previous = wrapper.set(Arc::new(Session("inner")));
            let _inner = ThreadLocalGuard::new(Arc::clone(&wrapper), previous);
            assert_eq!(wrapper.current().0, "inner");
        }
        assert_eq!(wrapper.current().0, "outer");

        drop(outer);
        assert!(!wrapper.is_bound());
    }
}
