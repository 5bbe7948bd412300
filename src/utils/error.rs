//! CMS 内核错误类型定义
//!
//! 本模块定义了内核中使用的所有错误类型。

use thiserror::Error;

/// CMS 内核核心错误类型
#[derive(Error, Debug)]
pub enum CmsError {
    // ==================== 路由系统错误 ====================

    /// 路由未找到
    #[error("路由未找到: {method} {path}")]
    RouteNotFound {
        method: String,
        path: String,
    },

    /// 路由模式无效（正则编译失败）
    #[error("路由模式无效: '{pattern}' - {reason}")]
    InvalidRoutePattern {
        pattern: String,
        reason: String,
    },

    /// 静态路由已存在
    #[error("路由已存在: {method} {path}")]
    RouteAlreadyExists {
        method: String,
        path: String,
    },

    /// 不支持的请求方法
    #[error("不支持的请求方法: '{0}'")]
    UnsupportedMethod(String),

    /// 处理器执行失败
    #[error("处理器执行失败: {0}")]
    HandlerFailed(String),

    // ==================== 扩展加载错误 ====================

    /// 扩展类标识未注册
    #[error("扩展未找到: '{0}'")]
    ExtensionNotFound(String),

    /// 扩展实例化或初始化失败
    #[error("扩展加载失败: '{key}' - {reason}")]
    ExtensionLoadFailed {
        key: String,
        reason: String,
    },

    /// 插件描述文件无效
    #[error("无效的插件描述: {0}")]
    InvalidDescriptor(String),

    /// 清单缓存损坏
    #[error("清单缓存损坏: {0}")]
    ManifestCorrupt(String),

    // ==================== 通知总线错误 ====================

    /// 订阅者回调失败
    #[error("订阅者 '{subscriber}' 处理 '{topic}' 失败: {reason}")]
    SubscriberFailed {
        subscriber: String,
        topic: String,
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CmsError>;

/// 状态码常量
pub mod status_code {
    /// 成功
    pub const OK: u16 = 200;

    /// 无内容
    pub const NO_CONTENT: u16 = 204;

    /// 请求格式错误
    pub const BAD_REQUEST: u16 = 400;

    /// 未找到
    pub const NOT_FOUND: u16 = 404;

    /// 方法不支持
    pub const METHOD_NOT_ALLOWED: u16 = 405;

    /// 冲突
    pub const CONFLICT: u16 = 409;

    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 500;
}

/// 错误码常量
pub mod error_code {
    // 路由错误 (ROUTE-xxx)
    pub const ROUTE_NOT_FOUND: &str = "ROUTE-001";
    pub const ROUTE_INVALID_PATTERN: &str = "ROUTE-002";
    pub const ROUTE_CONFLICT: &str = "ROUTE-003";
    pub const ROUTE_UNSUPPORTED_METHOD: &str = "ROUTE-004";
    pub const ROUTE_HANDLER_FAILED: &str = "ROUTE-005";

    // 扩展错误 (EXTENSION-xxx)
    pub const EXTENSION_NOT_FOUND: &str = "EXTENSION-001";
    pub const EXTENSION_LOAD_FAILED: &str = "EXTENSION-002";
    pub const EXTENSION_INVALID_DESCRIPTOR: &str = "EXTENSION-003";
    pub const EXTENSION_MANIFEST_CORRUPT: &str = "EXTENSION-004";

    // 通知错误 (BUS-xxx)
    pub const BUS_SUBSCRIBER_FAILED: &str = "BUS-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 内部错误
    pub const INTERNAL: &str = "CORE-001";
}

impl CmsError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CmsError::RouteNotFound { .. } => error_code::ROUTE_NOT_FOUND,
            CmsError::InvalidRoutePattern { .. } => error_code::ROUTE_INVALID_PATTERN,
            CmsError::RouteAlreadyExists { .. } => error_code::ROUTE_CONFLICT,
            CmsError::UnsupportedMethod(_) => error_code::ROUTE_UNSUPPORTED_METHOD,
            CmsError::HandlerFailed(_) => error_code::ROUTE_HANDLER_FAILED,
            CmsError::ExtensionNotFound(_) => error_code::EXTENSION_NOT_FOUND,
            CmsError::ExtensionLoadFailed { .. } => error_code::EXTENSION_LOAD_FAILED,
            CmsError::InvalidDescriptor(_) | CmsError::VersionParse(_) => {
                error_code::EXTENSION_INVALID_DESCRIPTOR
            }
            CmsError::ManifestCorrupt(_) => error_code::EXTENSION_MANIFEST_CORRUPT,
            CmsError::SubscriberFailed { .. } => error_code::BUS_SUBSCRIBER_FAILED,
            CmsError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CmsError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => error_code::INTERNAL,
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            CmsError::RouteNotFound { .. } => status_code::NOT_FOUND,
            CmsError::UnsupportedMethod(_) => status_code::METHOD_NOT_ALLOWED,
            CmsError::RouteAlreadyExists { .. } => status_code::CONFLICT,
            CmsError::InvalidConfigValue { .. } => status_code::BAD_REQUEST,
            _ => status_code::INTERNAL_ERROR,
        }
    }
}
