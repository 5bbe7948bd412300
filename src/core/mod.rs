//! 核心模块
//!
//! 包含配置、注册表与应用上下文。

pub mod config;
pub mod context;
pub mod registry;

pub use config::{
    CacheConfig, CmsConfig, CmsConfigBuilder, ContextConfig, LogConfig, RouterConfig,
};
pub use context::{AppContext, WeakAppContext};
pub use registry::{Registry, WeakRegistry};
