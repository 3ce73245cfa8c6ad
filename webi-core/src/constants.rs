//! 配置键常量
//!
//! 核心模块读取的配置键，Web 层的键定义在 `webi_web::constants`

/// 环境变量配置源的默认前缀，`WEBI_SERVER_PORT` 对应 `server.port`
pub const ENV_PREFIX: &str = "WEBI_";

// ==================== 日志 ====================

pub const LOGGING_LEVEL: &str = "logging.level";

pub const LOGGING_FORMAT: &str = "logging.format";

pub const LOGGING_SHOW_TARGET: &str = "logging.show-target";

/// EnvFilter 语法的过滤器
pub const LOGGING_FILTER: &str = "logging.filter";

// ==================== 容器 ====================

/// 为 true 时使用严格装配模式
pub const INJECTION_STRICT: &str = "webi.injection.strict";
