//! 内核配置
//!
//! 定义配置结构、文件加载、环境变量覆盖和校验。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::{CmsError, Result};

/// 环境变量：站点根目录
pub const ENV_ROOT_DIR: &str = "CMS_ROOT_DIR";
/// 环境变量：数据目录
pub const ENV_DATA_DIR: &str = "CMS_DATA_DIR";
/// 环境变量：日志级别
pub const ENV_LOG_LEVEL: &str = "CMS_LOG_LEVEL";

/// 清单缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 是否启用清单缓存（关闭后每次都全量扫描）
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 控制器清单文件名
    #[serde(default = "default_controllers_manifest")]
    pub controllers_manifest: String,

    /// 插件清单文件名
    #[serde(default = "default_plugins_manifest")]
    pub plugins_manifest: String,

    /// 已激活插件列表文件名
    #[serde(default = "default_active_plugins")]
    pub active_plugins: String,

    /// 强制重新扫描的查询参数名
    #[serde(default = "default_clear_param")]
    pub clear_param: String,
}

fn default_true() -> bool {
    true
}

fn default_controllers_manifest() -> String {
    "controllers_manifest.json".to_string()
}

fn default_plugins_manifest() -> String {
    "plugins_manifest.json".to_string()
}

fn default_active_plugins() -> String {
    "active_plugins.json".to_string()
}

fn default_clear_param() -> String {
    "clear_cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            controllers_manifest: default_controllers_manifest(),
            plugins_manifest: default_plugins_manifest(),
            active_plugins: default_active_plugins(),
            clear_param: default_clear_param(),
        }
    }
}

/// 路由配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 动态路由匹配结果的 LRU 缓存容量（0 表示关闭）
    #[serde(default = "default_route_cache_capacity")]
    pub route_cache_capacity: usize,
}

fn default_route_cache_capacity() -> usize {
    256
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            route_cache_capacity: default_route_cache_capacity(),
        }
    }
}

/// 请求上下文识别配置（按路径前缀）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// 后台路径前缀
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,

    /// 安装向导路径前缀
    #[serde(default = "default_install_prefix")]
    pub install_prefix: String,

    /// API 路径前缀
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

fn default_admin_prefix() -> String {
    "/admin".to_string()
}

fn default_install_prefix() -> String {
    "/install".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            admin_prefix: default_admin_prefix(),
            install_prefix: default_install_prefix(),
            api_prefix: default_api_prefix(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 内核配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 站点根目录
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// 数据目录（清单缓存与激活列表所在处），默认 `<root>/data`
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// 控制器目录，默认 `<root>/controllers`
    #[serde(default)]
    pub controllers_dir: Option<PathBuf>,

    /// 插件目录，默认 `<root>/plugins`
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,

    /// 清单缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 路由配置
    #[serde(default)]
    pub router: RouterConfig,

    /// 请求上下文配置
    #[serde(default)]
    pub contexts: ContextConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            root_dir: default_root_dir(),
            data_dir: None,
            controllers_dir: None,
            plugins_dir: None,
            cache: CacheConfig::default(),
            router: RouterConfig::default(),
            contexts: ContextConfig::default(),
            logging: LogConfig::default(),
            dev_mode: false,
        }
    }
}

impl CmsConfig {
    /// 创建配置构建器
    pub fn builder() -> CmsConfigBuilder {
        CmsConfigBuilder::new()
    }

    /// 从文件加载配置（`.json` 按 JSON 解析，其余按 YAML）
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CmsError::ConfigLoadFailed(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let mut config: CmsConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        Ok(config)
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_ROOT_DIR).filter(|v| !v.is_empty()) {
            self.root_dir = PathBuf::from(root);
        }
        if let Some(data) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(data));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let cache_files = [
            ("cache.controllers_manifest", &self.cache.controllers_manifest),
            ("cache.plugins_manifest", &self.cache.plugins_manifest),
            ("cache.active_plugins", &self.cache.active_plugins),
            ("cache.clear_param", &self.cache.clear_param),
        ];
        for (key, value) in cache_files {
            if value.trim().is_empty() {
                return Err(CmsError::InvalidConfigValue {
                    key: key.to_string(),
                    reason: "不能为空".to_string(),
                });
            }
        }

        let prefixes = [
            ("contexts.admin_prefix", &self.contexts.admin_prefix),
            ("contexts.install_prefix", &self.contexts.install_prefix),
            ("contexts.api_prefix", &self.contexts.api_prefix),
        ];
        for (key, value) in prefixes {
            if !value.starts_with('/') {
                return Err(CmsError::InvalidConfigValue {
                    key: key.to_string(),
                    reason: format!("路径前缀必须以 '/' 开头: '{}'", value),
                });
            }
        }

        Ok(())
    }

    /// 数据目录
    pub fn data_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("data"))
    }

    /// 控制器目录
    pub fn controllers_path(&self) -> PathBuf {
        self.controllers_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("controllers"))
    }

    /// 插件目录
    pub fn plugins_path(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("plugins"))
    }

    /// 数据目录下的缓存文件路径
    pub fn cache_file(&self, name: &str) -> PathBuf {
        self.data_path().join(name)
    }

    /// 站点根目录
    pub fn root_path(&self) -> &Path {
        &self.root_dir
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CmsConfigBuilder {
    config: CmsConfig,
}

impl CmsConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: CmsConfig::default(),
        }
    }

    /// 设置站点根目录
    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.root_dir = dir.into();
        self
    }

    /// 设置数据目录
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// 设置控制器目录
    pub fn controllers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.controllers_dir = Some(dir.into());
        self
    }

    /// 设置插件目录
    pub fn plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.plugins_dir = Some(dir.into());
        self
    }

    /// 关闭清单缓存
    pub fn disable_manifest_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// 设置动态路由缓存容量
    pub fn route_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.router.route_cache_capacity = capacity;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> CmsConfig {
        self.config
    }
}
