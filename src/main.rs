//! CMS Core 命令行入口
//!
//! 内容管理内核的命令行工具，提供配置检查、路由查看、请求分发与插件管理功能。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `routes` - 查看路由表
//! - `dispatch` - 分发一个请求并打印响应
//! - `plugins` - 列出插件目录中的插件
//! - `activate` / `deactivate` - 修改激活插件列表
//! - `clear-cache` - 删除清单缓存
//!
//! # 使用示例
//!
//! ```bash
//! # 查看后台上下文的路由表
//! cms-core -c site.yaml routes --context admin
//!
//! # 分发请求（上下文按路径前缀识别）
//! cms-core dispatch --method GET --path "/api/system/status"
//!
//! # 激活插件
//! cms-core activate seo
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use cms_core::{
    AppContext, Application, Body, CmsConfig, ExtensionCatalog, ExtensionLoader, LogGuard,
    Logger, LoggerConfig, Method, Request, RequestContext,
};

/// CMS Core - 内容管理内核
///
/// 路由表与分发器、扩展加载器与通知总线。
#[derive(Parser)]
#[command(name = "cms-core")]
#[command(version, about = "内容管理系统的请求分发与扩展内核", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "cms.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示文件与行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件是否有效，并显示解析后的配置内容。
    CheckConfig,

    /// 查看路由表
    ///
    /// 为指定上下文启动内核，显示全部已注册路由（按注册顺序）。
    Routes {
        /// 请求上下文 (admin, install, api, site)
        #[arg(long, default_value = "site")]
        context: RequestContext,
    },

    /// 分发请求
    Dispatch {
        /// 请求方法
        #[arg(short, long, default_value = "GET")]
        method: Method,

        /// 请求路径（可带查询串）
        #[arg(short, long)]
        path: String,

        /// 请求上下文（不指定则按路径前缀识别）
        #[arg(long)]
        context: Option<RequestContext>,
    },

    /// 列出插件
    Plugins,

    /// 激活插件
    Activate {
        /// 插件键
        key: String,
    },

    /// 停用插件
    Deactivate {
        /// 插件键
        key: String,
    },

    /// 删除清单缓存，下次启动时重新扫描
    ClearCache,
}

/// 加载配置：文件不存在时使用默认配置，然后应用环境变量与命令行覆盖
async fn load_config(cli: &Cli) -> anyhow::Result<CmsConfig> {
    let mut config = if cli.config.exists() {
        CmsConfig::from_file(&cli.config)
            .await
            .with_context(|| format!("无法加载配置文件 {}", cli.config.display()))?
    } else {
        CmsConfig::default()
    };
    config.apply_env_overrides();

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.dev {
        config.dev_mode = true;
    }

    config.validate().context("配置校验失败")?;
    Ok(config)
}

/// 初始化日志系统
fn init_logging(config: &CmsConfig) -> LogGuard {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    logger_config.show_file_line = config.dev_mode;
    Logger::try_init(logger_config)
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("CMS Core - 内容管理内核");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", cms_core::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 检查配置文件
async fn check_config(path: &Path) -> anyhow::Result<()> {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = if path.exists() {
        match CmsConfig::from_file(path).await.and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => {
                println!("✅ 配置文件有效！");
                config
            }
            Err(e) => {
                println!("❌ 配置文件无效: {}", e);
                return Err(e).with_context(|| format!("配置文件无效: {}", path.display()));
            }
        }
    } else {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        CmsConfig::default()
    };

    let yes_no = |v: bool| if v { "是" } else { "否" };
    println!();
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [目录]");
    println!("    根目录:         {}", config.root_dir.display());
    println!("    数据目录:       {}", config.data_path().display());
    println!("    控制器目录:     {}", config.controllers_path().display());
    println!("    插件目录:       {}", config.plugins_path().display());
    println!();
    println!("  [清单缓存]");
    println!("    启用:           {}", yes_no(config.cache.enabled));
    println!("    控制器清单:     {}", config.cache.controllers_manifest);
    println!("    插件清单:       {}", config.cache.plugins_manifest);
    println!("    激活列表:       {}", config.cache.active_plugins);
    println!("    清缓存参数:     {}", config.cache.clear_param);
    println!();
    println!("  [请求上下文]");
    println!("    后台前缀:       {}", config.contexts.admin_prefix);
    println!("    安装前缀:       {}", config.contexts.install_prefix);
    println!("    API 前缀:       {}", config.contexts.api_prefix);
    println!();
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", yes_no(config.logging.file_output));
    println!("    JSON 格式:      {}", yes_no(config.logging.json_format));
    println!("────────────────────────────────────────");
    Ok(())
}

/// 显示路由表
async fn show_routes(app: &Application, context: RequestContext) -> anyhow::Result<()> {
    let kernel = app
        .kernel(context)
        .await
        .with_context(|| format!("{} 上下文的内核启动失败", context))?;
    let routes = kernel.context().routes.export().await;

    println!();
    println!("路由表 (上下文: {})", context);
    println!("═══════════════════════════════════════");
    for route in &routes {
        println!(
            "  {:<7} {:<8} {:<40} {}",
            route.method,
            route.kind.as_str(),
            route.pattern,
            route.owner.as_deref().unwrap_or("-")
        );
    }
    println!("═══════════════════════════════════════");
    println!("  共 {} 条路由", routes.len());
    println!();
    Ok(())
}

/// 分发请求
async fn dispatch(
    app: &Application,
    method: Method,
    path: &str,
    context: Option<RequestContext>,
) -> anyhow::Result<()> {
    let request = Request::new(method, path).classify(&app.config().contexts);
    let request = match context {
        Some(context) => request.with_context(context),
        None => request,
    };

    println!();
    println!("分发请求");
    println!("═══════════════════════════════════════");
    println!("  请求:   {} {}", request.method, request.path);
    println!("  上下文: {}", request.context);
    println!();

    let target = format!("{} {}", request.method, request.path);
    let response = app
        .handle(request)
        .await
        .with_context(|| format!("分发请求失败: {}", target))?;

    println!("响应:");
    println!("────────────────────────────────────────");
    println!("  状态码:   {}", response.status);
    for (name, value) in &response.headers {
        println!("  {}: {}", name, value);
    }
    match response.body {
        Body::Empty => {}
        Body::Text(ref text) => println!("\n{}", text),
        Body::Json(ref value) => println!("\n{}", serde_json::to_string_pretty(value)?),
    }
    println!("────────────────────────────────────────");
    Ok(())
}

/// 列出插件
async fn list_plugins(loader: &ExtensionLoader) {
    let plugins = loader.discover_plugins().await;

    println!();
    println!("插件");
    println!("═══════════════════════════════════════");
    if plugins.is_empty() {
        println!("  (插件目录中没有可用的插件)");
    }
    for plugin in &plugins {
        let d = &plugin.descriptor;
        println!(
            "  [{}] {:<16} {:<10} {:<8} {}",
            if plugin.active { "x" } else { " " },
            d.key,
            d.version,
            d.context,
            d.name
        );
    }
    println!("═══════════════════════════════════════");
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            print_version();
            return Ok(());
        }
        Commands::CheckConfig => {
            check_config(&cli.config).await?;
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli).await?;
    let _guard = init_logging(&config);
    info!(root = %config.root_dir.display(), "已加载配置");

    let app = Application::builder()
        .config(config)
        .catalog(ExtensionCatalog::with_builtins())
        .build()?;

    match cli.command {
        Commands::Routes { context } => show_routes(&app, context).await?,
        Commands::Dispatch {
            method,
            ref path,
            context,
        } => dispatch(&app, method, path, context).await?,
        Commands::Plugins => {
            let loader = site_loader(&app).await;
            list_plugins(&loader).await;
        }
        Commands::Activate { ref key } => {
            let loader = site_loader(&app).await;
            if loader
                .activate_plugin(key)
                .await
                .with_context(|| format!("无法激活插件 {}", key))?
            {
                println!("✅ 已激活插件: {}", key);
            } else {
                println!("插件已处于激活状态: {}", key);
            }
        }
        Commands::Deactivate { ref key } => {
            let loader = site_loader(&app).await;
            if loader
                .deactivate_plugin(key)
                .await
                .with_context(|| format!("无法停用插件 {}", key))?
            {
                println!("✅ 已停用插件: {}", key);
            } else {
                println!("插件未激活: {}", key);
            }
        }
        Commands::ClearCache => {
            app.reload().await;
            println!("✅ 已删除清单缓存");
        }
        Commands::Version | Commands::CheckConfig => {}
    }

    Ok(())
}

/// 不加载任何扩展的加载器，用于插件管理命令
async fn site_loader(app: &Application) -> ExtensionLoader {
    let ctx = AppContext::new(Arc::clone(app.config()), RequestContext::Site).await;
    ExtensionLoader::new(ctx, Arc::new(ExtensionCatalog::new()))
}
