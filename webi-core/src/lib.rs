// webi-core: Webi 应用服务器的核心模块
//
// 提供：
// - BeanContext 依赖注入容器（按名称、按类型装配，递归装配，循环保护）
// - 线程作用域 Bean（每个请求线程一个实例）
// - 分层配置（TOML、环境变量、内存）
// - 基于 tracing 的日志初始化

pub mod bean;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod thread_local;
pub mod utils;

// 重新导出常用类型
pub use bean::{Bean, ErasedBean, Inject, Injectable, InjectionPoint};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use context::{BeanContext, InjectionMode};
pub use error::{ApplicationError, ApplicationResult, BeanError, BeanResult};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use thread_local::{ThreadLocalGuard, ThreadLocalWrapper};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{Bean, Inject, Injectable, InjectionPoint};
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::context::{BeanContext, InjectionMode};
    pub use crate::error::{ApplicationError, ApplicationResult, BeanError, BeanResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::utils;
}
