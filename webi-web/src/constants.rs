//! Web 层配置键与协议常量

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 请求体大小上限（字节）
pub const SERVER_MAX_BODY_SIZE: &str = "server.max-body-size";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== REST 配置 ====================

/// 未指定 `format` 时使用的输出格式
pub const WEBI_DEFAULT_FORMAT: &str = "webi.default-format";

/// 选择输出格式的查询参数
pub const FORMAT_PARAMETER: &str = "format";

/// 请求 ID 响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";
