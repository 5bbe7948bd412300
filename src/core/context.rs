//! 应用上下文
//!
//! 一次启动（或一个请求上下文）共享的全部状态：配置、注册表、路由表与通知总线。
//! 由调用方显式构造并传递，不使用任何全局状态，测试中可以同时存在多个独立实例。

use std::sync::{Arc, Weak};

use crate::core::config::CmsConfig;
use crate::core::registry::{Registry, WeakRegistry};
use crate::router::{Dispatcher, NotificationBus, RequestContext, RouteTable};

/// 应用上下文
#[derive(Debug, Clone)]
pub struct AppContext {
    /// 配置
    pub config: Arc<CmsConfig>,
    /// 注册表
    pub registry: Registry,
    /// 路由表
    pub routes: Arc<RouteTable>,
    /// 通知总线
    pub bus: NotificationBus,
    /// 当前请求上下文
    pub context: RequestContext,
}

impl AppContext {
    /// 创建上下文，注册表写入根目录与数据目录
    pub async fn new(config: Arc<CmsConfig>, context: RequestContext) -> Self {
        Self::with_bus(config, context, NotificationBus::new()).await
    }

    /// 使用已有通知总线创建上下文
    pub async fn with_bus(
        config: Arc<CmsConfig>,
        context: RequestContext,
        bus: NotificationBus,
    ) -> Self {
        let registry =
            Registry::with_paths(config.root_dir.clone(), config.data_path()).await;
        let routes = Arc::new(RouteTable::with_cache_capacity(
            config.router.route_cache_capacity,
        ));
        Self {
            config,
            registry,
            routes,
            bus,
            context,
        }
    }

    /// 基于本上下文的路由表与总线创建分发器
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.routes.clone(), self.bus.clone())
    }

    /// 弱引用形式，注册表与路由表不随之保持存活
    pub fn downgrade(&self) -> WeakAppContext {
        WeakAppContext {
            config: self.config.clone(),
            registry: self.registry.downgrade(),
            routes: Arc::downgrade(&self.routes),
            bus: self.bus.clone(),
            context: self.context,
        }
    }
}

/// 应用上下文的弱引用
///
/// 控制器与路由处理器需要长期保留上下文时持有此类型，
/// 路由表与注册表的生命周期只由内核决定。
#[derive(Debug, Clone)]
pub struct WeakAppContext {
    config: Arc<CmsConfig>,
    registry: WeakRegistry,
    routes: Weak<RouteTable>,
    bus: NotificationBus,
    context: RequestContext,
}

impl WeakAppContext {
    /// 所属内核仍存活时取回完整上下文
    pub fn upgrade(&self) -> Option<AppContext> {
        Some(AppContext {
            config: self.config.clone(),
            registry: self.registry.upgrade()?,
            routes: self.routes.upgrade()?,
            bus: self.bus.clone(),
            context: self.context,
        })
    }

    /// 配置
    pub fn config(&self) -> &Arc<CmsConfig> {
        &self.config
    }

    /// 请求上下文
    pub fn context(&self) -> RequestContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{handler_fn, Method, Response};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let config = Arc::new(CmsConfig::builder().root_dir("/srv/a").build());
        let first = AppContext::new(config.clone(), RequestContext::Site).await;
        let second = AppContext::new(config, RequestContext::Admin).await;

        first
            .routes
            .register(Method::Get, "/only-first", handler_fn(|_, _| Ok(Response::empty())))
            .await
            .unwrap();

        assert!(first.routes.find(Method::Get, "/only-first").await.is_some());
        assert!(second.routes.find(Method::Get, "/only-first").await.is_none());
        assert_eq!(
            first.registry.data_path().await,
            Some(PathBuf::from("/srv/a/data"))
        );
    }

    #[tokio::test]
    async fn test_weak_context_does_not_keep_state_alive() {
        let config = Arc::new(CmsConfig::default());
        let ctx = AppContext::new(config, RequestContext::Admin).await;
        let weak = ctx.downgrade();
        assert_eq!(weak.context(), RequestContext::Admin);

        let upgraded = weak.upgrade().unwrap();
        assert!(Arc::ptr_eq(&upgraded.routes, &ctx.routes));
        drop(upgraded);

        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}
