//! 清单缓存
//!
//! 数据目录中的 JSON 文件：
//!
//! - `controllers_manifest.json`：`{key: class}`
//! - `plugins_manifest.json`：`[{key, path, class, context, menu?}]`
//! - `active_plugins.json`：`[key, ...]`
//!
//! 读取失败（文件不存在、无法读取、JSON 形状不对）一律视为缓存未命中。
//! 写入是尽力而为的：先写临时文件再重命名，失败只记录日志。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::config::CmsConfig;
use crate::module::metadata::PluginManifestEntry;
use crate::utils::{short_id, CmsError, Result};

/// 控制器清单：键 -> 类标识
pub type ControllerManifest = BTreeMap<String, String>;

/// 插件清单
pub type PluginManifest = Vec<PluginManifestEntry>;

/// 清单缓存存储
#[derive(Debug, Clone)]
pub struct ManifestStore {
    controllers_path: PathBuf,
    plugins_path: PathBuf,
    active_path: PathBuf,
    enabled: bool,
}

impl ManifestStore {
    /// 根据配置定位缓存文件
    pub fn from_config(config: &CmsConfig) -> Self {
        Self {
            controllers_path: config.cache_file(&config.cache.controllers_manifest),
            plugins_path: config.cache_file(&config.cache.plugins_manifest),
            active_path: config.cache_file(&config.cache.active_plugins),
            enabled: config.cache.enabled,
        }
    }

    /// 控制器清单路径
    pub fn controllers_path(&self) -> &Path {
        &self.controllers_path
    }

    /// 插件清单路径
    pub fn plugins_path(&self) -> &Path {
        &self.plugins_path
    }

    /// 激活列表路径
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// 是否启用清单缓存
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 读取控制器清单
    pub async fn read_controllers(&self) -> Option<ControllerManifest> {
        if !self.enabled {
            return None;
        }
        read_json(&self.controllers_path).await
    }

    /// 写入控制器清单
    pub async fn write_controllers(&self, manifest: &ControllerManifest) {
        if self.enabled {
            write_json_best_effort(&self.controllers_path, manifest).await;
        }
    }

    /// 读取插件清单
    pub async fn read_plugins(&self) -> Option<PluginManifest> {
        if !self.enabled {
            return None;
        }
        read_json(&self.plugins_path).await
    }

    /// 写入插件清单
    pub async fn write_plugins(&self, manifest: &PluginManifest) {
        if self.enabled {
            write_json_best_effort(&self.plugins_path, manifest).await;
        }
    }

    /// 读取激活插件列表，文件不存在或损坏时视为没有激活的插件
    pub async fn read_active(&self) -> Vec<String> {
        read_json(&self.active_path).await.unwrap_or_default()
    }

    /// 写入激活插件列表
    ///
    /// 与清单不同，激活列表是用户数据，写入失败会返回错误。
    pub async fn write_active(&self, keys: &[String]) -> Result<()> {
        write_json_atomic(&self.active_path, &keys).await
    }

    /// 删除两份清单，下次加载时重新扫描
    pub async fn invalidate(&self) {
        for path in [&self.controllers_path, &self.plugins_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "删除清单缓存"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "删除清单缓存失败"),
            }
        }
    }

    /// 只删除插件清单
    pub async fn invalidate_plugins(&self) {
        match tokio::fs::remove_file(&self.plugins_path).await {
            Ok(()) => debug!(path = %self.plugins_path.display(), "删除插件清单"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.plugins_path.display(), error = %e, "删除插件清单失败"),
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "缓存文件不存在");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "缓存文件无法读取，视为未命中");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = CmsError::ManifestCorrupt(format!("{}: {}", path.display(), e));
            warn!(error = %err, "缓存文件损坏，视为未命中");
            None
        }
    }
}

async fn write_json_best_effort<T: Serialize + ?Sized>(path: &Path, value: &T) {
    match write_json_atomic(path, value).await {
        Ok(()) => debug!(path = %path.display(), "写入清单缓存"),
        Err(e) => warn!(path = %path.display(), error = %e, "写入清单缓存失败"),
    }
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, short_id("w")));

    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::ActivationContext;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ManifestStore {
        let config = CmsConfig::builder().root_dir(dir.path()).build();
        ManifestStore::from_config(&config)
    }

    #[tokio::test]
    async fn test_controller_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.read_controllers().await.is_none());

        let mut manifest = ControllerManifest::new();
        manifest.insert("users".to_string(), "users_controller".to_string());
        store.write_controllers(&manifest).await;

        assert_eq!(store.read_controllers().await, Some(manifest));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(store.plugins_path().parent().unwrap())
            .await
            .unwrap();

        // 对象而不是数组
        tokio::fs::write(store.plugins_path(), r#"{"seo": {}}"#).await.unwrap();
        assert!(store.read_plugins().await.is_none());

        tokio::fs::write(store.plugins_path(), "not json at all").await.unwrap();
        assert!(store.read_plugins().await.is_none());

        // 数组而不是对象
        tokio::fs::write(store.controllers_path(), r#"["users"]"#).await.unwrap();
        assert!(store.read_controllers().await.is_none());
    }

    #[tokio::test]
    async fn test_plugin_manifest_and_invalidate() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let manifest = vec![PluginManifestEntry {
            key: "seo".to_string(),
            path: dir.path().join("plugins/seo"),
            class: "seo_plugin".to_string(),
            context: ActivationContext::Admin,
            menu: vec![],
        }];
        store.write_plugins(&manifest).await;
        store.write_controllers(&ControllerManifest::new()).await;
        assert_eq!(store.read_plugins().await, Some(manifest));

        store.invalidate().await;
        assert!(!store.plugins_path().exists());
        assert!(!store.controllers_path().exists());
        // 重复删除不报错
        store.invalidate().await;
    }

    #[tokio::test]
    async fn test_active_list_missing_means_none_active() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.read_active().await.is_empty());

        store
            .write_active(&["seo".to_string(), "forms".to_string()])
            .await
            .unwrap();
        assert_eq!(store.read_active().await, vec!["seo", "forms"]);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_reads_or_writes() {
        let dir = TempDir::new().unwrap();
        let config = CmsConfig::builder()
            .root_dir(dir.path())
            .disable_manifest_cache()
            .build();
        let store = ManifestStore::from_config(&config);

        store.write_controllers(&ControllerManifest::new()).await;
        assert!(!store.controllers_path().exists());
        assert!(store.read_controllers().await.is_none());
    }
}
