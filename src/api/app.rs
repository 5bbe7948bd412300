//! 应用入口
//!
//! [`Kernel`] 为一个请求上下文完成一次完整启动：加载控制器与插件、排序、注册路由。
//! [`Application`] 按请求上下文缓存已启动的内核，并负责请求周期的边界：
//! 未匹配转换为 404，处理器错误转换为 500，发送前发布 `response.before_send`。
//!
//! # 示例
//!
//! ```rust,no_run
//! use cms_core::{Application, CmsConfig, ExtensionCatalog, Method};
//!
//! #[tokio::main]
//! async fn main() -> cms_core::Result<()> {
//!     let app = Application::builder()
//!         .config(CmsConfig::builder().root_dir("/srv/site").build())
//!         .catalog(ExtensionCatalog::with_builtins())
//!         .build()?;
//!
//!     let response = app.handle_target(Method::Get, "/api/system/status").await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::core::{AppContext, CmsConfig};
use crate::module::{
    ExtensionCatalog, ExtensionLoader, LoadedController, LoadedPlugin, ManifestStore,
};
use crate::router::{
    topics, DispatchOutcome, Dispatcher, Event, Method, NotificationBus, NotificationCallback,
    Request, RequestContext, Response,
};
use crate::utils::{CmsError, Result};

/// 外部订阅：在每个内核加载扩展之前注册到其通知总线
#[derive(Clone)]
pub struct BusSubscription {
    /// 订阅者
    pub subscriber: String,
    /// 主题
    pub topic: String,
    /// 优先级
    pub priority: i32,
    /// 回调
    pub callback: NotificationCallback,
}

impl std::fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription")
            .field("subscriber", &self.subscriber)
            .field("topic", &self.topic)
            .field("priority", &self.priority)
            .finish()
    }
}

/// 启动选项
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// 忽略清单缓存，重新扫描
    pub clear_cache: bool,
    /// 外部订阅
    pub subscriptions: Vec<BusSubscription>,
}

impl LoadOptions {
    /// 强制重新扫描
    pub fn cleared() -> Self {
        Self {
            clear_cache: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// 内核
// ============================================================================

/// 已启动的内核（单个请求上下文）
pub struct Kernel {
    ctx: AppContext,
    dispatcher: Dispatcher,
    loader: ExtensionLoader,
    booted_at: DateTime<Utc>,
}

impl Kernel {
    /// 启动
    ///
    /// 依次执行：外部订阅 → 加载控制器 → 加载插件 → 排序 → 注册路由。
    #[instrument(skip_all, fields(context = %context, clear_cache = options.clear_cache))]
    pub async fn boot(
        config: Arc<CmsConfig>,
        catalog: Arc<ExtensionCatalog>,
        context: RequestContext,
        options: LoadOptions,
    ) -> Result<Self> {
        let bus = NotificationBus::new();
        for sub in &options.subscriptions {
            bus.subscribe_arc(
                sub.subscriber.clone(),
                sub.topic.clone(),
                sub.priority,
                sub.callback.clone(),
            )
            .await;
        }

        let ctx = AppContext::with_bus(config, context, bus).await;
        let mut loader = ExtensionLoader::new(ctx.clone(), catalog);

        loader.load_controllers(options.clear_cache).await?;
        loader.load_plugins(options.clear_cache).await?;
        loader.sort_controllers();
        let routes = loader.register_routes().await?;

        info!(
            controllers = loader.controllers().len(),
            plugins = loader.plugins().len(),
            routes,
            "内核启动完成"
        );

        Ok(Self {
            dispatcher: ctx.dispatcher(),
            ctx,
            loader,
            booted_at: Utc::now(),
        })
    }

    /// 应用上下文
    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// 分发器
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 已加载的控制器（注册顺序）
    pub fn controllers(&self) -> &[LoadedController] {
        self.loader.controllers()
    }

    /// 已加载的插件
    pub fn plugins(&self) -> &[LoadedPlugin] {
        self.loader.plugins()
    }

    /// 启动时间
    pub fn booted_at(&self) -> DateTime<Utc> {
        self.booted_at
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("context", &self.ctx.context)
            .field("loader", &self.loader)
            .field("booted_at", &self.booted_at)
            .finish()
    }
}

// ============================================================================
// 应用
// ============================================================================

/// 应用
///
/// 每个请求上下文的内核只启动一次，后续请求复用。
pub struct Application {
    config: Arc<CmsConfig>,
    catalog: Arc<ExtensionCatalog>,
    subscriptions: Vec<BusSubscription>,
    kernels: RwLock<HashMap<RequestContext, Arc<Kernel>>>,
}

impl Application {
    /// 创建构建器
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// 配置
    pub fn config(&self) -> &Arc<CmsConfig> {
        &self.config
    }

    /// 获取（必要时启动）指定上下文的内核
    pub async fn kernel(&self, context: RequestContext) -> Result<Arc<Kernel>> {
        if let Some(kernel) = self.kernels.read().await.get(&context) {
            return Ok(kernel.clone());
        }

        let mut kernels = self.kernels.write().await;
        if let Some(kernel) = kernels.get(&context) {
            return Ok(kernel.clone());
        }

        let kernel = Arc::new(self.boot(context, false).await?);
        kernels.insert(context, kernel.clone());
        Ok(kernel)
    }

    /// 忽略清单缓存重新启动指定上下文的内核
    pub async fn reboot(&self, context: RequestContext) -> Result<Arc<Kernel>> {
        let mut kernels = self.kernels.write().await;
        let kernel = Arc::new(self.boot(context, true).await?);
        kernels.insert(context, kernel.clone());
        info!(context = %context, "内核已重新启动");
        Ok(kernel)
    }

    /// 丢弃全部已启动的内核并删除清单缓存，下次请求时重新扫描
    pub async fn reload(&self) {
        self.kernels.write().await.clear();
        ManifestStore::from_config(&self.config).invalidate().await;
        info!("已清除全部内核与清单缓存");
    }

    /// 已启动的上下文
    pub async fn booted_contexts(&self) -> Vec<RequestContext> {
        let mut contexts: Vec<RequestContext> =
            self.kernels.read().await.keys().copied().collect();
        contexts.sort();
        contexts
    }

    async fn boot(&self, context: RequestContext, clear_cache: bool) -> Result<Kernel> {
        Kernel::boot(
            self.config.clone(),
            self.catalog.clone(),
            context,
            LoadOptions {
                clear_cache,
                subscriptions: self.subscriptions.clone(),
            },
        )
        .await
    }

    /// 处理请求
    ///
    /// 请求携带清缓存参数时先重新启动该上下文的内核。
    #[instrument(skip(self, request), fields(request_id = %request.request_id, method = %request.method, path = %request.path, context = %request.context))]
    pub async fn handle(&self, request: Request) -> Result<Response> {
        let context = request.context;
        let kernel = if request.has_query(&self.config.cache.clear_param) {
            self.reboot(context).await?
        } else {
            self.kernel(context).await?
        };

        let response = match kernel.dispatcher().dispatch(&request).await {
            Ok(DispatchOutcome::Matched { response, .. }) => response,
            Ok(DispatchOutcome::Unmatched) => {
                debug!("没有匹配的路由，返回 404");
                Response::not_found(context, request.method, &request.path)
            }
            Err(e) => {
                error!(error = %e, "处理器执行失败");
                let err = match e {
                    CmsError::HandlerFailed(_) => e,
                    other => CmsError::HandlerFailed(other.to_string()),
                };
                Response::from_error(context, &err)
            }
        };

        // HEAD 响应一律不带响应体
        let response = if request.method == Method::Head {
            response.without_body()
        } else {
            response
        };
        let response = response.with_header("x-request-id", request.request_id.clone());
        self.before_send(&kernel, response).await
    }

    /// 按路径前缀识别上下文后处理请求
    pub async fn handle_target(&self, method: Method, target: &str) -> Result<Response> {
        let request = Request::new(method, target).classify(&self.config.contexts);
        self.handle(request).await
    }

    async fn before_send(&self, kernel: &Kernel, response: Response) -> Result<Response> {
        let bus = &kernel.context().bus;
        if bus.subscriber_count(topics::RESPONSE_BEFORE_SEND).await == 0 {
            return Ok(response);
        }

        let mut event = Event::new(topics::RESPONSE_BEFORE_SEND, serde_json::to_value(&response)?);
        bus.publish(&mut event).await?;
        Ok(serde_json::from_value(event.data)?)
    }

    /// 组装会话数据：以 `base` 为初始数据发布 `auth.session_data`
    pub async fn session_data(&self, context: RequestContext, base: Value) -> Result<Value> {
        let kernel = self.kernel(context).await?;
        let event = kernel
            .context()
            .bus
            .notify(topics::AUTH_SESSION_DATA, base)
            .await?;
        Ok(event.data)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("catalog", &self.catalog)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

/// 应用构建器
#[derive(Debug, Default)]
pub struct ApplicationBuilder {
    config: Option<CmsConfig>,
    catalog: Option<ExtensionCatalog>,
    subscriptions: Vec<BusSubscription>,
}

impl ApplicationBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置配置
    pub fn config(mut self, config: CmsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 设置扩展目录
    pub fn catalog(mut self, catalog: ExtensionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 添加外部订阅
    pub fn subscribe<F>(
        mut self,
        subscriber: impl Into<String>,
        topic: impl Into<String>,
        priority: i32,
        callback: F,
    ) -> Self
    where
        F: Fn(&mut Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscriptions.push(BusSubscription {
            subscriber: subscriber.into(),
            topic: topic.into(),
            priority,
            callback: Arc::new(callback),
        });
        self
    }

    /// 构建应用（校验配置，不启动内核）
    pub fn build(self) -> Result<Application> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Application {
            config: Arc::new(config),
            catalog: Arc::new(self.catalog.unwrap_or_else(ExtensionCatalog::with_builtins)),
            subscriptions: self.subscriptions,
            kernels: RwLock::new(HashMap::new()),
        })
    }
}
