//! 内置控制器
//!
//! `SystemController` 提供运行状态、路由表与会话数据的只读接口。

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AppContext, WeakAppContext};
use crate::module::loader::{CONTROLLER_PREFIX, PLUGIN_PREFIX};
use crate::module::{Controller, RouteRegistrar};
use crate::router::{async_handler_fn, topics, Response};
use crate::utils::{CmsError, Result};

/// 内置系统控制器的键
pub const SYSTEM_CONTROLLER_KEY: &str = "system";

/// 内置系统控制器的类标识
pub const SYSTEM_CONTROLLER_CLASS: &str = "system_controller";

/// 系统控制器
///
/// - `GET /api/system/status`
/// - `GET /api/system/routes`
/// - `GET /api/system/session`
///
/// 控制器实例存放在注册表中，处理器存放在路由表中，因此两者只持有上下文的弱引用。
#[derive(Debug, Default)]
pub struct SystemController {
    ctx: Option<WeakAppContext>,
}

impl SystemController {
    /// 创建控制器（在 `init` 中绑定上下文）
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> Result<WeakAppContext> {
        self.ctx
            .clone()
            .ok_or_else(|| CmsError::InitFailed("系统控制器尚未初始化".to_string()))
    }
}

fn live(weak: &WeakAppContext) -> Result<AppContext> {
    weak.upgrade()
        .ok_or_else(|| CmsError::HandlerFailed("所属内核已释放".to_string()))
}

#[async_trait]
impl Controller for SystemController {
    fn rank(&self) -> i32 {
        0
    }

    async fn init(&mut self, ctx: &AppContext) -> Result<()> {
        self.ctx = Some(ctx.downgrade());
        Ok(())
    }

    async fn register_routes(&self, routes: &RouteRegistrar<'_>) -> Result<()> {
        let weak = self.context()?;
        let prefix = weak.config().contexts.api_prefix.trim_end_matches('/').to_string();

        let status_ctx = weak.clone();
        routes
            .get(
                &format!("{}/system/status", prefix),
                async_handler_fn(move |_req, _params| {
                    let weak = status_ctx.clone();
                    async move {
                        let ctx = live(&weak)?;
                        let strip = |keys: Vec<String>, prefix: &str| -> Vec<String> {
                            keys.into_iter()
                                .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
                                .collect()
                        };
                        let controllers =
                            strip(ctx.registry.keys_with_prefix(CONTROLLER_PREFIX).await, CONTROLLER_PREFIX);
                        let plugins =
                            strip(ctx.registry.keys_with_prefix(PLUGIN_PREFIX).await, PLUGIN_PREFIX);
                        let stats = ctx.routes.stats().await;

                        Ok(Response::json(json!({
                            "version": crate::VERSION,
                            "context": ctx.context,
                            "dev_mode": ctx.config.dev_mode,
                            "controllers": controllers,
                            "plugins": plugins,
                            "routes": stats,
                            "bus": ctx.bus.stats(),
                        })))
                    }
                }),
            )
            .await?;

        let routes_ctx = weak.clone();
        routes
            .get(
                &format!("{}/system/routes", prefix),
                async_handler_fn(move |_req, _params| {
                    let weak = routes_ctx.clone();
                    async move {
                        let ctx = live(&weak)?;
                        Ok(Response::json(json!({ "routes": ctx.routes.export().await })))
                    }
                }),
            )
            .await?;

        routes
            .get(
                &format!("{}/system/session", prefix),
                async_handler_fn(move |_req, _params| {
                    let weak = weak.clone();
                    async move {
                        let ctx = live(&weak)?;
                        let event = ctx
                            .bus
                            .notify(
                                topics::AUTH_SESSION_DATA,
                                json!({ "context": ctx.context, "menu": [] }),
                            )
                            .await?;
                        Ok(Response::json(event.data))
                    }
                }),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CmsConfig;
    use crate::router::{Body, Method, Request, RequestContext, RouteHandler, RouteTable};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_requires_init() {
        let controller = SystemController::new();
        let table = RouteTable::new();
        let err = controller
            .register_routes(&RouteRegistrar::new(&table, SYSTEM_CONTROLLER_KEY))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::InitFailed(_)));
    }

    #[tokio::test]
    async fn test_routes_endpoint_lists_itself() {
        let config = Arc::new(CmsConfig::default());
        let ctx = AppContext::new(config, RequestContext::Api).await;
        let mut controller = SystemController::new();
        controller.init(&ctx).await.unwrap();
        controller
            .register_routes(&RouteRegistrar::new(&ctx.routes, SYSTEM_CONTROLLER_KEY))
            .await
            .unwrap();

        let request = Request::new(Method::Get, "/api/system/routes");
        let response = ctx
            .dispatcher()
            .dispatch(&request)
            .await
            .unwrap()
            .into_response()
            .unwrap();
        match response.body {
            Body::Json(value) => {
                let routes = value["routes"].as_array().cloned().unwrap_or_default();
                assert_eq!(routes.len(), 3);
                assert_eq!(routes[0]["owner"], "system");
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handlers_fail_once_context_is_gone() {
        let config = Arc::new(CmsConfig::default());
        let ctx = AppContext::new(config, RequestContext::Api).await;
        let mut controller = SystemController::new();
        controller.init(&ctx).await.unwrap();

        // 处理器注册到另一张路由表，原上下文释放后无法再取回注册表
        let detached = RouteTable::new();
        controller
            .register_routes(&RouteRegistrar::new(&detached, SYSTEM_CONTROLLER_KEY))
            .await
            .unwrap();
        drop(ctx);

        let found = detached.find(Method::Get, "/api/system/status").await.unwrap();
        let request = Request::new(Method::Get, "/api/system/status");
        let err = found
            .entry
            .handler
            .handle(&request, &found.params)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::HandlerFailed(_)));
    }
}
