//! 扩展模块
//!
//! 包含扩展系统的核心组件：
//! - 控制器与插件接口、扩展目录
//! - 插件描述与清单数据结构
//! - 清单缓存
//! - 扩展加载器

pub mod extension;
pub mod loader;
pub mod manifest;
pub mod metadata;

// 重导出常用类型
pub use extension::{
    Controller, ControllerFactory, ExtensionCatalog, Plugin, PluginFactory, RouteRegistrar,
    DEFAULT_RANK,
};
pub use loader::{DiscoveredPlugin, ExtensionLoader, LoadedController, LoadedPlugin};
pub use manifest::{ControllerManifest, ManifestStore, PluginManifest};
pub use metadata::{ActivationContext, MenuItem, PluginDescriptor, PluginManifestEntry};
