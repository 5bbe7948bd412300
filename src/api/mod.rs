//! API 模块
//!
//! 对外的应用入口与内置控制器。
//!
//! # 模块概览
//!
//! - `app`: 内核启动、按上下文缓存的应用与请求周期
//! - `builtin`: 内置系统控制器

pub mod app;
pub mod builtin;

// 重导出主要类型
pub use app::{Application, ApplicationBuilder, BusSubscription, Kernel, LoadOptions};
pub use builtin::{SystemController, SYSTEM_CONTROLLER_CLASS, SYSTEM_CONTROLLER_KEY};
