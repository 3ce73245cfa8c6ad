//! 错误类型
//!
//! 容器层面的错误使用 [`BeanError`]，应用启动层面（日志、配置、服务器）使用
//! [`ApplicationError`]。两者都基于 thiserror，调用方可以直接 `?` 传播。

use thiserror::Error;

/// Bean 容器错误
#[derive(Debug, Error)]
pub enum BeanError {
    /// 严格模式下存在无法满足的注入点
    #[error("Injection failed for {owner}.{field}: no bean of type '{type_name}' is registered")]
    InjectionRequiredMissing {
        owner: String,
        field: String,
        type_name: String,
    },

    /// 注入点尚未装配
    #[error("Field '{field}' of type '{type_name}' has not been wired")]
    NotWired {
        field: String,
        type_name: String,
    },

    /// 线程作用域 Bean 在当前线程没有绑定实例
    #[error("Thread-scoped bean '{type_name}' has no instance bound to thread {thread}")]
    ThreadLocalUnbound { type_name: String, thread: String },

    /// 找不到 Bean
    #[error("Bean not found: {0}")]
    BeanNotFound(String),
}

/// 容器操作结果
pub type BeanResult<T> = std::result::Result<T, BeanError>;

/// 应用错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Bean(#[from] BeanError),

    #[error("{0}")]
    Other(String),
}

/// 应用操作结果
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;

impl From<anyhow::Error> for ApplicationError {
    fn from(err: anyhow::Error) -> Self {
        ApplicationError::Other(format!("{:#}", err))
    }
}
