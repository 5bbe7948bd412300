//! 工具模块
//!
//! 错误类型、ID 生成与日志系统。

pub mod error;
pub mod id;
pub mod logger;

pub use error::{error_code, status_code, CmsError, Result};
pub use id::{request_id, short_id};
pub use logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
