//! 扩展元数据定义
//!
//! 插件描述文件（plugin.yaml / plugin.json）与清单缓存中的数据结构。

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::router::RequestContext;
use crate::utils::{CmsError, Result};

/// 插件激活上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationContext {
    /// 任意上下文
    #[default]
    All,
    /// 后台
    Admin,
    /// 安装向导
    Install,
    /// API
    Api,
    /// 前台站点
    Site,
}

impl ActivationContext {
    /// 是否在给定请求上下文中加载
    pub fn matches(&self, context: RequestContext) -> bool {
        match self {
            ActivationContext::All => true,
            ActivationContext::Admin => context == RequestContext::Admin,
            ActivationContext::Install => context == RequestContext::Install,
            ActivationContext::Api => context == RequestContext::Api,
            ActivationContext::Site => context == RequestContext::Site,
        }
    }
}

impl fmt::Display for ActivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationContext::All => "all",
            ActivationContext::Admin => "admin",
            ActivationContext::Install => "install",
            ActivationContext::Api => "api",
            ActivationContext::Site => "site",
        };
        f.write_str(name)
    }
}

/// 菜单项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// 标题
    pub title: String,

    /// 链接
    pub url: String,

    /// 图标
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// 排序（越小越靠前）
    #[serde(default)]
    pub order: i32,
}

/// 插件描述文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// 插件键（激活列表中使用的名称）
    pub key: String,

    /// 显示名称
    pub name: String,

    /// 版本（semver）
    pub version: String,

    /// 对内核版本的要求（semver 范围）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,

    /// 插件类标识（在扩展目录中查找构造函数）
    pub class: String,

    /// 激活上下文
    #[serde(default)]
    pub context: ActivationContext,

    /// 菜单项
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub menu: Vec<MenuItem>,

    /// 描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// YAML 描述文件名
pub const PLUGIN_DESCRIPTOR_YAML: &str = "plugin.yaml";
/// JSON 描述文件名
pub const PLUGIN_DESCRIPTOR_JSON: &str = "plugin.json";

impl PluginDescriptor {
    /// 在插件目录中查找描述文件，YAML 优先
    pub async fn locate(dir: &Path) -> Option<PathBuf> {
        for name in [PLUGIN_DESCRIPTOR_YAML, PLUGIN_DESCRIPTOR_JSON] {
            let path = dir.join(name);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => return Some(path),
                _ => continue,
            }
        }
        None
    }

    /// 从文件解析描述
    pub async fn parse_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let descriptor: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// 验证描述
    ///
    /// 全部问题合并为一个 `InvalidDescriptor` 错误返回。
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.key.is_empty() {
            errors.push("插件键不能为空".to_string());
        } else if !is_valid_key(&self.key) {
            errors.push(format!(
                "插件键 '{}' 格式无效，只允许小写字母、数字、下划线和连字符",
                self.key
            ));
        }

        if self.name.is_empty() {
            errors.push("插件名称不能为空".to_string());
        }

        if self.class.is_empty() {
            errors.push("插件类标识不能为空".to_string());
        }

        if Version::parse(&self.version).is_err() {
            errors.push(format!(
                "无效的版本号格式 '{}', 请使用 semver 格式 (如 1.0.0)",
                self.version
            ));
        }

        if let Some(ref requires) = self.requires {
            if VersionReq::parse(requires).is_err() {
                errors.push(format!(
                    "版本要求格式无效: '{}', 请使用 semver 范围格式 (如 ^1.0)",
                    requires
                ));
            }
        }

        for (index, item) in self.menu.iter().enumerate() {
            if item.title.is_empty() || item.url.is_empty() {
                errors.push(format!("第 {} 个菜单项缺少标题或链接", index + 1));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CmsError::InvalidDescriptor(format!(
                "{}: {}",
                self.key,
                errors.join("; ")
            )))
        }
    }

    /// 是否兼容给定的内核版本（没有声明要求时总是兼容）
    pub fn is_compatible_with(&self, core_version: &str) -> Result<bool> {
        let Some(ref requires) = self.requires else {
            return Ok(true);
        };
        let req = VersionReq::parse(requires)?;
        let version = Version::parse(core_version)?;
        Ok(req.matches(&version))
    }
}

/// 扩展键只允许小写字母、数字、下划线和连字符
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// 插件清单条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifestEntry {
    /// 插件键
    pub key: String,

    /// 插件目录
    pub path: PathBuf,

    /// 插件类标识
    pub class: String,

    /// 激活上下文
    pub context: ActivationContext,

    /// 菜单项
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub menu: Vec<MenuItem>,
}

impl PluginManifestEntry {
    /// 由描述与目录生成清单条目
    pub fn from_descriptor(descriptor: &PluginDescriptor, path: PathBuf) -> Self {
        Self {
            key: descriptor.key.clone(),
            path,
            class: descriptor.class.clone(),
            context: descriptor.context,
            menu: descriptor.menu.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_yaml() -> &'static str {
        r#"
key: seo
name: SEO Tools
version: 1.2.0
requires: ">=0.1"
class: seo_plugin
context: admin
menu:
  - title: SEO
    url: /admin/seo
    icon: search
    order: 5
"#
    }

    #[test]
    fn test_parse_yaml_descriptor() {
        let descriptor: PluginDescriptor = serde_yaml::from_str(descriptor_yaml()).unwrap();
        descriptor.validate().unwrap();
        assert_eq!(descriptor.context, ActivationContext::Admin);
        assert_eq!(descriptor.menu[0].icon.as_deref(), Some("search"));
        assert!(descriptor.is_compatible_with("0.1.0").unwrap());
        assert!(!descriptor.is_compatible_with("0.0.9").unwrap());
    }

    #[test]
    fn test_context_defaults_to_all() {
        let descriptor: PluginDescriptor = serde_json::from_str(
            r#"{"key":"forms","name":"Forms","version":"0.3.1","class":"forms_plugin"}"#,
        )
        .unwrap();
        assert_eq!(descriptor.context, ActivationContext::All);
        assert!(descriptor.context.matches(RequestContext::Install));
    }

    #[test]
    fn test_validation_collects_errors() {
        let descriptor = PluginDescriptor {
            key: "Bad Key".to_string(),
            name: String::new(),
            version: "one".to_string(),
            requires: Some("not a range".to_string()),
            class: "x".to_string(),
            context: ActivationContext::All,
            menu: vec![],
            description: None,
        };
        let err = descriptor.validate().unwrap_err().to_string();
        assert!(err.contains("插件键"));
        assert!(err.contains("插件名称"));
        assert!(err.contains("版本号"));
        assert!(err.contains("版本要求"));
    }

    #[test]
    fn test_activation_matching() {
        assert!(ActivationContext::Admin.matches(RequestContext::Admin));
        assert!(!ActivationContext::Admin.matches(RequestContext::Site));
        assert!(ActivationContext::Api.matches(RequestContext::Api));
    }

    #[tokio::test]
    async fn test_locate_prefers_yaml_files() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(PluginDescriptor::locate(dir.path()).await.is_none());

        tokio::fs::write(dir.path().join(PLUGIN_DESCRIPTOR_JSON), "{}").await.unwrap();
        // 同名目录不算描述文件
        tokio::fs::create_dir(dir.path().join(PLUGIN_DESCRIPTOR_YAML)).await.unwrap();
        assert_eq!(
            PluginDescriptor::locate(dir.path()).await,
            Some(dir.path().join(PLUGIN_DESCRIPTOR_JSON))
        );

        tokio::fs::remove_dir(dir.path().join(PLUGIN_DESCRIPTOR_YAML)).await.unwrap();
        tokio::fs::write(dir.path().join(PLUGIN_DESCRIPTOR_YAML), descriptor_yaml()).await.unwrap();
        assert_eq!(
            PluginDescriptor::locate(dir.path()).await,
            Some(dir.path().join(PLUGIN_DESCRIPTOR_YAML))
        );
    }
}
