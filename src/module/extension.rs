//! 扩展接口与扩展目录
//!
//! 控制器与插件通过稳定的类标识在 [`ExtensionCatalog`] 中登记构造函数，
//! 加载器根据文件系统约定或清单缓存中的类标识实例化它们。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AppContext;
use crate::router::{Method, RouteKind, RouteTable, SharedHandler};
use crate::utils::{CmsError, Result};

/// 默认控制器排序值
pub const DEFAULT_RANK: i32 = 10;

/// 控制器
///
/// 排序值越小越先注册路由；兜底路由（如 `/(.*)`）应使用较大的排序值。
#[async_trait]
pub trait Controller: Send + Sync {
    /// 排序值
    fn rank(&self) -> i32 {
        DEFAULT_RANK
    }

    /// 构造后调用一次，返回错误时跳过该控制器
    ///
    /// 需要保留上下文时保存 [`AppContext::downgrade`] 的结果。
    async fn init(&mut self, _ctx: &AppContext) -> Result<()> {
        Ok(())
    }

    /// 注册路由
    async fn register_routes(&self, routes: &RouteRegistrar<'_>) -> Result<()>;
}

/// 插件
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 构造后调用一次，可在此订阅通知；返回错误时跳过该插件
    ///
    /// 实例与订阅回调都由内核持有，保留上下文时使用 [`AppContext::downgrade`]。
    async fn init(&mut self, _ctx: &AppContext) -> Result<()> {
        Ok(())
    }

    /// 插件提供的控制器：(键, 控制器)
    fn controllers(&self) -> Vec<(String, Box<dyn Controller>)> {
        Vec::new()
    }
}

/// 路由注册器
///
/// 交给控制器使用，注册的每条路由都记录所属控制器。
pub struct RouteRegistrar<'a> {
    table: &'a RouteTable,
    owner: String,
}

impl<'a> RouteRegistrar<'a> {
    /// 创建注册器
    pub fn new(table: &'a RouteTable, owner: impl Into<String>) -> Self {
        Self {
            table,
            owner: owner.into(),
        }
    }

    /// 所属控制器键
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 注册任意方法的路由
    pub async fn route(
        &self,
        method: Method,
        pattern: &str,
        handler: SharedHandler,
    ) -> Result<RouteKind> {
        self.table
            .register_entry(method, pattern, handler, Some(self.owner.clone()))
            .await
    }

    /// 注册 GET 路由
    pub async fn get(&self, pattern: &str, handler: SharedHandler) -> Result<RouteKind> {
        self.route(Method::Get, pattern, handler).await
    }

    /// 注册 POST 路由
    pub async fn post(&self, pattern: &str, handler: SharedHandler) -> Result<RouteKind> {
        self.route(Method::Post, pattern, handler).await
    }

    /// 注册 PUT 路由
    pub async fn put(&self, pattern: &str, handler: SharedHandler) -> Result<RouteKind> {
        self.route(Method::Put, pattern, handler).await
    }

    /// 注册 PATCH 路由
    pub async fn patch(&self, pattern: &str, handler: SharedHandler) -> Result<RouteKind> {
        self.route(Method::Patch, pattern, handler).await
    }

    /// 注册 DELETE 路由
    pub async fn delete(&self, pattern: &str, handler: SharedHandler) -> Result<RouteKind> {
        self.route(Method::Delete, pattern, handler).await
    }
}

/// 控制器构造函数
pub type ControllerFactory = Arc<dyn Fn() -> Result<Box<dyn Controller>> + Send + Sync>;

/// 插件构造函数
pub type PluginFactory = Arc<dyn Fn() -> Result<Box<dyn Plugin>> + Send + Sync>;

/// 扩展目录
///
/// 类标识 -> 构造函数。内置控制器无需文件即会加载，且不写入清单。
#[derive(Clone, Default)]
pub struct ExtensionCatalog {
    controllers: HashMap<String, ControllerFactory>,
    plugins: HashMap<String, PluginFactory>,
    builtins: Vec<(String, String)>,
}

impl ExtensionCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含内置控制器的目录
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_builtin_controller(
            crate::api::builtin::SYSTEM_CONTROLLER_KEY,
            crate::api::builtin::SYSTEM_CONTROLLER_CLASS,
            || Ok(Box::new(crate::api::builtin::SystemController::new()) as Box<dyn Controller>),
        );
        catalog
    }

    /// 登记控制器构造函数
    pub fn register_controller<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Controller>> + Send + Sync + 'static,
    {
        self.controllers.insert(class.into(), Arc::new(factory));
        self
    }

    /// 登记内置控制器：总是以给定键加载
    pub fn register_builtin_controller<F>(
        &mut self,
        key: impl Into<String>,
        class: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Controller>> + Send + Sync + 'static,
    {
        let class = class.into();
        self.builtins.push((key.into(), class.clone()));
        self.register_controller(class, factory)
    }

    /// 登记插件构造函数
    pub fn register_plugin<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.plugins.insert(class.into(), Arc::new(factory));
        self
    }

    /// 实例化控制器
    pub fn create_controller(&self, class: &str) -> Result<Box<dyn Controller>> {
        let factory = self
            .controllers
            .get(class)
            .ok_or_else(|| CmsError::ExtensionNotFound(class.to_string()))?;
        factory()
    }

    /// 实例化插件
    pub fn create_plugin(&self, class: &str) -> Result<Box<dyn Plugin>> {
        let factory = self
            .plugins
            .get(class)
            .ok_or_else(|| CmsError::ExtensionNotFound(class.to_string()))?;
        factory()
    }

    /// 内置控制器：(键, 类标识)
    pub fn builtins(&self) -> &[(String, String)] {
        &self.builtins
    }

    /// 是否登记了控制器类
    pub fn has_controller(&self, class: &str) -> bool {
        self.controllers.contains_key(class)
    }

    /// 是否登记了插件类
    pub fn has_plugin(&self, class: &str) -> bool {
        self.plugins.contains_key(class)
    }
}

impl fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut controllers: Vec<&String> = self.controllers.keys().collect();
        controllers.sort();
        let mut plugins: Vec<&String> = self.plugins.keys().collect();
        plugins.sort();
        f.debug_struct("ExtensionCatalog")
            .field("controllers", &controllers)
            .field("plugins", &plugins)
            .field("builtins", &self.builtins)
            .finish()
    }
}
