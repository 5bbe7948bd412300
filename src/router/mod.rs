//! 路由模块
//!
//! 包含请求分发的核心组件：
//! - 请求/响应数据结构
//! - 路由处理器
//! - 路由表（静态 + 动态）
//! - 通知事件与通知总线
//! - 分发器

pub mod dispatcher;
pub mod event;
pub mod event_bus;
pub mod handler;
pub mod request;
pub mod route_table;

// 重导出常用类型
pub use dispatcher::{DispatchOutcome, DispatchStats, DispatchStatsSnapshot, Dispatcher};
pub use event::{topics, Event, EventBuilder};
pub use event_bus::{
    BusStats, NotificationBus, NotificationCallback, SubscriptionInfo, DEFAULT_PRIORITY,
};
pub use handler::{async_handler_fn, handler_fn, RouteHandler, SharedHandler};
pub use request::{Body, Method, Request, RequestContext, Response};
pub use route_table::{
    RouteCache, RouteCacheStats, RouteEntry, RouteInfo, RouteKind, RouteMatch, RouteTable,
    RouteTableStats,
};
