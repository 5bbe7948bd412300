//! 配置加载集成测试
//!
//! 测试配置文件加载、校验以及配置对内核启动的影响

use cms_core::{Application, CmsConfig, CmsError, ExtensionCatalog, Method};
use std::path::PathBuf;
use tempfile::TempDir;

/// 测试从 YAML 文件加载完整配置
#[tokio::test]
async fn test_load_yaml_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cms.yaml");
    tokio::fs::write(
        &path,
        r#"
root_dir: /srv/site
plugins_dir: /opt/cms/plugins
cache:
  enabled: false
  clear_param: rescan
router:
  route_cache_capacity: 64
contexts:
  admin_prefix: /backend
logging:
  level: debug
  json_format: true
dev_mode: true
"#,
    )
    .await
    .unwrap();

    let config = CmsConfig::from_file(&path).await.unwrap();
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.root_dir, PathBuf::from("/srv/site"));
    assert_eq!(config.plugins_path(), PathBuf::from("/opt/cms/plugins"));
    assert_eq!(config.controllers_path(), PathBuf::from("/srv/site/controllers"));
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.clear_param, "rescan");
    assert_eq!(config.router.route_cache_capacity, 64);
    assert_eq!(config.contexts.admin_prefix, "/backend");
    assert_eq!(config.contexts.api_prefix, "/api");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json_format);
    assert!(config.dev_mode);
    assert!(config.validate().is_ok());
}

/// 测试 JSON 格式配置
#[tokio::test]
async fn test_load_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cms.json");
    tokio::fs::write(
        &path,
        r#"{ "root_dir": "/srv/json", "cache": { "active_plugins": "enabled.json" } }"#,
    )
    .await
    .unwrap();

    let config = CmsConfig::from_file(&path).await.unwrap();
    assert_eq!(
        config.cache_file(&config.cache.active_plugins),
        PathBuf::from("/srv/json/data/enabled.json")
    );
    assert_eq!(config.cache.controllers_manifest, "controllers_manifest.json");
}

/// 测试加载失败的情况
#[tokio::test]
async fn test_load_errors() {
    let temp_dir = TempDir::new().unwrap();

    let missing = CmsConfig::from_file(temp_dir.path().join("missing.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(missing, CmsError::ConfigLoadFailed(_)));

    let broken = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&broken, "cache: [not, a, map").await.unwrap();
    assert!(matches!(
        CmsConfig::from_file(&broken).await,
        Err(CmsError::Yaml(_))
    ));

    let broken_json = temp_dir.path().join("broken.json");
    tokio::fs::write(&broken_json, "{ root_dir: ").await.unwrap();
    assert!(matches!(
        CmsConfig::from_file(&broken_json).await,
        Err(CmsError::Json(_))
    ));
}

/// 测试配置校验
#[test]
fn test_config_validation() {
    let mut config = CmsConfig::default();
    assert!(config.validate().is_ok());

    config.contexts.install_prefix = "install".to_string();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CmsError::InvalidConfigValue { ref key, .. } if key == "contexts.install_prefix"));

    let mut config = CmsConfig::default();
    config.cache.clear_param = String::new();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CmsError::InvalidConfigValue { ref key, .. } if key == "cache.clear_param"));
}

/// 测试自定义清缓存参数与上下文前缀对请求处理的影响
#[tokio::test]
async fn test_config_drives_request_handling() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = CmsConfig::builder()
        .root_dir(temp_dir.path())
        .route_cache_capacity(0)
        .build();
    config.contexts.api_prefix = "/rest".to_string();
    config.cache.clear_param = "rescan".to_string();

    let app = Application::builder()
        .config(config)
        .catalog(ExtensionCatalog::with_builtins())
        .build()
        .unwrap();

    let status = app
        .handle_target(Method::Get, "/rest/system/status")
        .await
        .unwrap();
    assert_eq!(status.status, 200);

    // 未匹配的 API 请求按 JSON 错误返回
    let missing = app.handle_target(Method::Get, "/rest/none").await.unwrap();
    assert_eq!(missing.status, 404);
    assert_eq!(
        missing.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );

    app.handle_target(Method::Get, "/rest/system/status?rescan")
        .await
        .unwrap();
    assert!(temp_dir.path().join("data/controllers_manifest.json").exists());
}

/// 测试关闭清单缓存后不写入任何文件
#[tokio::test]
async fn test_disabled_cache_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let app = Application::builder()
        .config(
            CmsConfig::builder()
                .root_dir(temp_dir.path())
                .disable_manifest_cache()
                .build(),
        )
        .build()
        .unwrap();

    let response = app.handle_target(Method::Get, "/api/system/routes").await.unwrap();
    assert_eq!(response.status, 200);
    assert!(!temp_dir.path().join("data").exists());
}
