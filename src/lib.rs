//! # CMS Core - 内容管理内核
//!
//! 内容管理系统的请求分发与扩展内核，提供以下核心功能：
//!
//! - **路由表与分发器**: 静态路由精确匹配，动态路由按注册顺序正则匹配
//! - **扩展加载器**: 按文件约定发现控制器与插件，清单缓存避免重复扫描
//! - **通知总线**: 按优先级同步调用的回调注册表
//! - **配置管理**: JSON / YAML 配置文件与环境变量覆盖
//! - **日志系统**: 结构化日志记录
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use cms_core::{Application, CmsConfig, Method};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Application::builder()
//!         .config(CmsConfig::builder().root_dir(".").build())
//!         .build()?;
//!
//!     let response = app.handle_target(Method::Get, "/api/system/status").await?;
//!     println!("{:?}", response.body);
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `router` - 请求、路由表、分发器与通知总线
//! - `module` - 控制器与插件、清单缓存、扩展加载器
//! - `core` - 配置、注册表与应用上下文
//! - `api` - 应用入口与内置控制器
//! - `utils` - 错误类型、ID 与日志

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod module;
pub mod router;
pub mod utils;

// 重导出常用类型，方便使用
pub use router::{
    async_handler_fn, handler_fn, topics, Body, DispatchOutcome, Dispatcher, Event, Method,
    NotificationBus, Request, RequestContext, Response, RouteHandler, RouteKind, RouteTable,
    DEFAULT_PRIORITY,
};

pub use module::{
    ActivationContext, Controller, ExtensionCatalog, ExtensionLoader, MenuItem, Plugin,
    PluginDescriptor, RouteRegistrar, DEFAULT_RANK,
};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, request_id, short_id, status_code, CmsError, Result};

pub use crate::core::{AppContext, CmsConfig, CmsConfigBuilder, Registry, WeakAppContext};
pub use api::{Application, ApplicationBuilder, Kernel, LoadOptions, SystemController};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
