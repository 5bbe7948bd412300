//! 扩展加载器
//!
//! 负责发现、实例化并登记控制器与插件，随后按排序值把控制器的路由注册进路由表。
//!
//! # 加载流程
//! 1. `load_controllers`：内置控制器 + 清单回放（或目录扫描并写回清单）
//! 2. `load_plugins`：按激活列表与请求上下文过滤，插件可追加控制器与菜单
//! 3. `sort_controllers`：按排序值稳定排序
//! 4. `register_routes`：依次注册路由

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::extension::{Controller, ExtensionCatalog, Plugin, RouteRegistrar};
use super::manifest::{ControllerManifest, ManifestStore, PluginManifest};
use super::metadata::{ActivationContext, MenuItem, PluginDescriptor, PluginManifestEntry};
use crate::core::AppContext;
use crate::router::{topics, Event, DEFAULT_PRIORITY};
use crate::utils::{CmsError, Result};

/// 控制器文件名约定后缀
pub const CONTROLLER_SUFFIX: &str = "_controller";

/// 注册表中控制器的键前缀
pub const CONTROLLER_PREFIX: &str = "controller.";

/// 注册表中插件的键前缀
pub const PLUGIN_PREFIX: &str = "plugin.";

/// 已加载的控制器
#[derive(Clone)]
pub struct LoadedController {
    /// 控制器键
    pub key: String,
    /// 类标识
    pub class: String,
    /// 提供该控制器的插件
    pub plugin: Option<String>,
    /// 实例
    pub controller: Arc<dyn Controller>,
}

impl LoadedController {
    /// 排序值
    pub fn rank(&self) -> i32 {
        self.controller.rank()
    }
}

impl std::fmt::Debug for LoadedController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedController")
            .field("key", &self.key)
            .field("class", &self.class)
            .field("plugin", &self.plugin)
            .field("rank", &self.rank())
            .finish()
    }
}

/// 已加载的插件
#[derive(Clone)]
pub struct LoadedPlugin {
    /// 插件键
    pub key: String,
    /// 类标识
    pub class: String,
    /// 插件目录
    pub path: PathBuf,
    /// 激活上下文
    pub context: ActivationContext,
    /// 菜单项
    pub menu: Vec<MenuItem>,
    /// 实例
    pub plugin: Arc<dyn Plugin>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("key", &self.key)
            .field("class", &self.class)
            .field("path", &self.path)
            .field("context", &self.context)
            .finish()
    }
}

/// 发现的插件（供命令行列出）
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// 插件目录
    pub path: PathBuf,
    /// 描述
    pub descriptor: PluginDescriptor,
    /// 是否已激活
    pub active: bool,
}

/// 扩展加载器
pub struct ExtensionLoader {
    ctx: AppContext,
    catalog: Arc<ExtensionCatalog>,
    store: ManifestStore,
    controllers: Vec<LoadedController>,
    plugins: Vec<LoadedPlugin>,
}

impl ExtensionLoader {
    /// 创建加载器
    pub fn new(ctx: AppContext, catalog: Arc<ExtensionCatalog>) -> Self {
        let store = ManifestStore::from_config(&ctx.config);
        Self {
            ctx,
            catalog,
            store,
            controllers: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// 清单存储
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// 已加载的控制器（当前顺序）
    pub fn controllers(&self) -> &[LoadedController] {
        &self.controllers
    }

    /// 已加载的插件
    pub fn plugins(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    // ========================================================================
    // 控制器
    // ========================================================================

    /// 加载控制器
    ///
    /// `clear` 为 true 时忽略清单，重新扫描控制器目录并写回清单。
    /// 返回本次加载成功的控制器键。
    pub async fn load_controllers(&mut self, clear: bool) -> Result<Vec<String>> {
        let mut loaded = Vec::new();

        for (key, class) in self.catalog.builtins().to_vec() {
            if self.load_controller(&key, &class).await {
                loaded.push(key);
            }
        }

        let cached = if clear {
            None
        } else {
            self.store.read_controllers().await
        };

        let manifest = match cached {
            Some(manifest) => {
                debug!(count = manifest.len(), "回放控制器清单");
                manifest
            }
            None => {
                let manifest = self.scan_controllers().await;
                self.store.write_controllers(&manifest).await;
                manifest
            }
        };

        for (key, class) in &manifest {
            if self.load_controller(key, class).await {
                loaded.push(key.clone());
            }
        }

        info!(count = loaded.len(), "控制器加载完成");
        self.ctx
            .bus
            .notify(topics::CONTROLLERS_LOADED, json!({ "controllers": loaded }))
            .await?;

        Ok(loaded)
    }

    /// 扫描控制器目录：文件名（第一个 '.' 之前）以 `_controller` 结尾
    pub async fn scan_controllers(&self) -> ControllerManifest {
        let dir = self.ctx.config.controllers_path();
        let mut manifest = ControllerManifest::new();

        for name in sorted_entries(&dir, false).await {
            let stem = name.split('.').next().unwrap_or_default();
            let Some(key) = stem.strip_suffix(CONTROLLER_SUFFIX) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            debug!(key = %key, file = %name, "发现控制器");
            manifest.insert(key.to_string(), stem.to_string());
        }

        manifest
    }

    async fn load_controller(&mut self, key: &str, class: &str) -> bool {
        let controller = match self.catalog.create_controller(class) {
            Ok(controller) => controller,
            Err(e) => {
                warn!(key = %key, class = %class, error = %e, "控制器实例化失败，跳过");
                return false;
            }
        };
        self.adopt_controller(key, class, None, controller).await
    }

    async fn adopt_controller(
        &mut self,
        key: &str,
        class: &str,
        plugin: Option<&str>,
        mut controller: Box<dyn Controller>,
    ) -> bool {
        if self.controllers.iter().any(|c| c.key == key) {
            warn!(key = %key, class = %class, "控制器键重复，跳过");
            return false;
        }

        if let Err(e) = controller.init(&self.ctx).await {
            warn!(key = %key, class = %class, error = %e, "控制器初始化失败，跳过");
            return false;
        }

        let loaded = LoadedController {
            key: key.to_string(),
            class: class.to_string(),
            plugin: plugin.map(str::to_string),
            controller: Arc::from(controller),
        };
        self.ctx
            .registry
            .set(format!("{}{}", CONTROLLER_PREFIX, key), loaded.clone())
            .await;
        self.controllers.push(loaded);

        debug!(key = %key, class = %class, "控制器已加载");
        true
    }

    /// 按排序值稳定排序（相同排序值保持加载顺序）
    pub fn sort_controllers(&mut self) {
        self.controllers.sort_by_key(LoadedController::rank);
    }

    /// 按当前顺序注册全部控制器的路由，返回注册后的路由总数
    pub async fn register_routes(&self) -> Result<usize> {
        for loaded in &self.controllers {
            let registrar = RouteRegistrar::new(&self.ctx.routes, loaded.key.clone());
            loaded
                .controller
                .register_routes(&registrar)
                .await
                .map_err(|e| CmsError::ExtensionLoadFailed {
                    key: loaded.key.clone(),
                    reason: e.to_string(),
                })?;
        }

        let stats = self.ctx.routes.stats().await;
        let total = stats.static_route_count + stats.dynamic_route_count;
        info!(
            controllers = self.controllers.len(),
            routes = total,
            "路由注册完成"
        );
        Ok(total)
    }

    // ========================================================================
    // 插件
    // ========================================================================

    /// 加载插件
    ///
    /// 清单保存全部已激活的插件，上下文过滤在加载时进行。
    /// 返回本次加载成功的插件键。
    pub async fn load_plugins(&mut self, clear: bool) -> Result<Vec<String>> {
        let cached = if clear {
            None
        } else {
            self.store.read_plugins().await
        };

        let manifest = match cached {
            Some(manifest) => {
                debug!(count = manifest.len(), "回放插件清单");
                manifest
            }
            None => {
                let manifest = self.scan_plugins().await;
                self.store.write_plugins(&manifest).await;
                manifest
            }
        };

        let context = self.ctx.context;
        let mut loaded = Vec::new();

        for entry in manifest {
            if !entry.context.matches(context) {
                debug!(key = %entry.key, plugin_context = %entry.context, context = %context, "插件不在当前上下文中加载");
                continue;
            }
            if self.load_plugin(entry).await {
                if let Some(plugin) = self.plugins.last() {
                    loaded.push(plugin.key.clone());
                }
            }
        }

        info!(count = loaded.len(), context = %context, "插件加载完成");
        self.ctx
            .bus
            .notify(
                topics::PLUGINS_LOADED,
                json!({ "plugins": loaded, "context": context }),
            )
            .await?;

        Ok(loaded)
    }

    /// 扫描插件目录，只保留已激活且与内核版本兼容的插件
    pub async fn scan_plugins(&self) -> PluginManifest {
        let active = self.store.read_active().await;
        self.discover_plugins()
            .await
            .into_iter()
            .filter(|found| active.contains(&found.descriptor.key))
            .filter(|found| match found.descriptor.is_compatible_with(crate::VERSION) {
                Ok(true) => true,
                Ok(false) => {
                    warn!(
                        key = %found.descriptor.key,
                        requires = ?found.descriptor.requires,
                        version = crate::VERSION,
                        "插件与内核版本不兼容，跳过"
                    );
                    false
                }
                Err(e) => {
                    warn!(key = %found.descriptor.key, error = %e, "插件版本要求无法解析，跳过");
                    false
                }
            })
            .map(|found| PluginManifestEntry::from_descriptor(&found.descriptor, found.path))
            .collect()
    }

    /// 发现插件目录下全部可解析的插件（不论是否激活）
    pub async fn discover_plugins(&self) -> Vec<DiscoveredPlugin> {
        let dir = self.ctx.config.plugins_path();
        let active = self.store.read_active().await;
        let mut found: Vec<DiscoveredPlugin> = Vec::new();

        for name in sorted_entries(&dir, true).await {
            let path = dir.join(&name);
            let Some(descriptor_path) = PluginDescriptor::locate(&path).await else {
                debug!(dir = %path.display(), "目录中没有插件描述文件，跳过");
                continue;
            };

            match PluginDescriptor::parse_file(&descriptor_path).await {
                Ok(descriptor) => {
                    if found.iter().any(|p| p.descriptor.key == descriptor.key) {
                        warn!(key = %descriptor.key, dir = %path.display(), "插件键重复，跳过");
                        continue;
                    }
                    let is_active = active.contains(&descriptor.key);
                    found.push(DiscoveredPlugin {
                        path,
                        descriptor,
                        active: is_active,
                    });
                }
                Err(e) => {
                    warn!(file = %descriptor_path.display(), error = %e, "插件描述解析失败，跳过");
                }
            }
        }

        found
    }

    async fn load_plugin(&mut self, entry: PluginManifestEntry) -> bool {
        let mut plugin = match self.catalog.create_plugin(&entry.class) {
            Ok(plugin) => plugin,
            Err(e) => {
                warn!(key = %entry.key, class = %entry.class, error = %e, "插件实例化失败，跳过");
                return false;
            }
        };

        if let Err(e) = plugin.init(&self.ctx).await {
            warn!(key = %entry.key, class = %entry.class, error = %e, "插件初始化失败，跳过");
            return false;
        }

        for (key, controller) in plugin.controllers() {
            let class = format!("{}::{}", entry.class, key);
            self.adopt_controller(&key, &class, Some(entry.key.as_str()), controller)
                .await;
        }

        if !entry.menu.is_empty() {
            self.subscribe_menu(&entry.key, entry.menu.clone()).await;
        }

        let loaded = LoadedPlugin {
            key: entry.key,
            class: entry.class,
            path: entry.path,
            context: entry.context,
            menu: entry.menu,
            plugin: Arc::from(plugin),
        };
        self.ctx
            .registry
            .set(format!("{}{}", PLUGIN_PREFIX, loaded.key), loaded.clone())
            .await;
        debug!(key = %loaded.key, "插件已加载");
        self.plugins.push(loaded);
        true
    }

    async fn subscribe_menu(&self, key: &str, mut menu: Vec<MenuItem>) {
        menu.sort_by_key(|item| item.order);
        let items: Vec<Value> = menu
            .iter()
            .map(|item| {
                let mut value = json!({
                    "title": item.title,
                    "url": item.url,
                    "order": item.order,
                    "plugin": key,
                });
                if let Some(ref icon) = item.icon {
                    value["icon"] = json!(icon);
                }
                value
            })
            .collect();

        self.ctx
            .bus
            .subscribe(
                format!("{}{}", PLUGIN_PREFIX, key),
                topics::AUTH_SESSION_DATA,
                DEFAULT_PRIORITY,
                move |event: &mut Event| {
                    for item in &items {
                        event.push("menu", item.clone());
                    }
                    Ok(())
                },
            )
            .await;
    }

    // ========================================================================
    // 激活管理
    // ========================================================================

    /// 激活插件：写入激活列表并删除插件清单，返回列表是否变化
    pub async fn activate_plugin(&self, key: &str) -> Result<bool> {
        let exists = self
            .discover_plugins()
            .await
            .iter()
            .any(|p| p.descriptor.key == key);
        if !exists {
            return Err(CmsError::ExtensionNotFound(key.to_string()));
        }

        let mut active = self.store.read_active().await;
        if active.iter().any(|k| k == key) {
            return Ok(false);
        }
        active.push(key.to_string());
        self.store.write_active(&active).await?;
        self.store.invalidate_plugins().await;
        info!(key = %key, "插件已激活");
        Ok(true)
    }

    /// 停用插件：从激活列表移除并删除插件清单，返回列表是否变化
    pub async fn deactivate_plugin(&self, key: &str) -> Result<bool> {
        let mut active = self.store.read_active().await;
        let before = active.len();
        active.retain(|k| k != key);
        if active.len() == before {
            return Ok(false);
        }
        self.store.write_active(&active).await?;
        self.store.invalidate_plugins().await;
        info!(key = %key, "插件已停用");
        Ok(true)
    }
}

impl std::fmt::Debug for ExtensionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("context", &self.ctx.context)
            .field("controllers", &self.controllers)
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// 目录下的条目名（按名称排序）；`dirs` 为 true 时只取子目录，否则只取文件
async fn sorted_entries(dir: &Path, dirs: bool) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "目录无法读取，跳过");
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(_) => continue,
        };
        if is_dir == dirs {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CmsConfig;
    use crate::router::RequestContext;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Ranked(i32);

    #[async_trait]
    impl Controller for Ranked {
        fn rank(&self) -> i32 {
            self.0
        }

        async fn register_routes(&self, _routes: &RouteRegistrar<'_>) -> Result<()> {
            Ok(())
        }
    }

    async fn loader(dir: &TempDir) -> ExtensionLoader {
        let config = Arc::new(CmsConfig::builder().root_dir(dir.path()).build());
        let ctx = AppContext::new(config, RequestContext::Site).await;
        let mut catalog = ExtensionCatalog::new();
        catalog.register_controller("a_controller", || {
            Ok(Box::new(Ranked(20)) as Box<dyn Controller>)
        });
        catalog.register_controller("b_controller", || {
            Ok(Box::new(Ranked(10)) as Box<dyn Controller>)
        });
        catalog.register_controller("c_controller", || {
            Ok(Box::new(Ranked(10)) as Box<dyn Controller>)
        });
        ExtensionLoader::new(ctx, Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_scan_uses_naming_convention() {
        let dir = TempDir::new().unwrap();
        let controllers = dir.path().join("controllers");
        std::fs::create_dir_all(&controllers).unwrap();
        for name in ["b_controller.rs", "a_controller.php", "helpers.rs", "_controller.rs"] {
            std::fs::write(controllers.join(name), "").unwrap();
        }
        std::fs::create_dir_all(controllers.join("nested_controller")).unwrap();

        let loader = loader(&dir).await;
        let manifest = loader.scan_controllers().await;
        let keys: Vec<&str> = manifest.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(manifest["a"], "a_controller");
    }

    #[tokio::test]
    async fn test_sort_is_stable_by_rank() {
        let dir = TempDir::new().unwrap();
        let controllers = dir.path().join("controllers");
        std::fs::create_dir_all(&controllers).unwrap();
        for name in ["a_controller.rs", "b_controller.rs", "c_controller.rs"] {
            std::fs::write(controllers.join(name), "").unwrap();
        }

        let mut loader = loader(&dir).await;
        loader.load_controllers(false).await.unwrap();
        loader.sort_controllers();

        let order: Vec<&str> = loader.controllers().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_missing_directories_load_nothing() {
        let dir = TempDir::new().unwrap();
        let mut loader = loader(&dir).await;
        assert!(loader.load_controllers(false).await.unwrap().is_empty());
        assert!(loader.load_plugins(false).await.unwrap().is_empty());
    }
}
