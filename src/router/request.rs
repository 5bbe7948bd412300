//! 请求与响应数据结构
//!
//! 定义分发器的输入（方法、路径、查询参数、请求上下文）与输出（状态码与响应体）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

use crate::core::config::ContextConfig;
use crate::utils::{request_id, status_code, CmsError};

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    /// 全部方法
    pub const ALL: [Method; 6] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
    ];

    /// 大写名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            _ => Err(CmsError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// 请求上下文
///
/// 粗粒度的请求分类，用于决定加载哪些插件以及 404 响应的形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestContext {
    /// 后台
    Admin,
    /// 安装向导
    Install,
    /// API
    Api,
    /// 前台站点
    Site,
}

impl RequestContext {
    /// 根据路径前缀识别上下文
    pub fn classify(path: &str, config: &ContextConfig) -> Self {
        let has_prefix = |prefix: &str| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
        };

        if has_prefix(&config.admin_prefix) {
            RequestContext::Admin
        } else if has_prefix(&config.install_prefix) {
            RequestContext::Install
        } else if has_prefix(&config.api_prefix) {
            RequestContext::Api
        } else {
            RequestContext::Site
        }
    }

    /// 小写名称
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestContext::Admin => "admin",
            RequestContext::Install => "install",
            RequestContext::Api => "api",
            RequestContext::Site => "site",
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestContext {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(RequestContext::Admin),
            "install" => Ok(RequestContext::Install),
            "api" => Ok(RequestContext::Api),
            "site" => Ok(RequestContext::Site),
            other => Err(CmsError::InvalidConfigValue {
                key: "context".to_string(),
                reason: format!("未知的请求上下文: '{}'", other),
            }),
        }
    }
}

/// 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// 请求唯一标识（UUID v4）
    pub request_id: String,

    /// 请求方法
    pub method: Method,

    /// 路径（不含查询串）
    pub path: String,

    /// 查询参数
    #[serde(default)]
    pub query: HashMap<String, String>,

    /// 请求体
    #[serde(default)]
    pub body: Value,

    /// 请求上下文
    pub context: RequestContext,

    /// 请求时间戳
    pub timestamp: DateTime<Utc>,
}

impl Request {
    /// 创建请求，`target` 可以携带查询串（`/users?page=2`）
    ///
    /// 上下文默认为 `Site`，可用 [`Request::with_context`] 或
    /// [`Request::classify`] 修正。
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };

        Self {
            request_id: request_id(),
            method,
            path: path.to_string(),
            query,
            body: Value::Null,
            context: RequestContext::Site,
            timestamp: Utc::now(),
        }
    }

    /// GET 请求
    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    /// 设置上下文
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// 按路径前缀识别上下文
    pub fn classify(mut self, config: &ContextConfig) -> Self {
        self.context = RequestContext::classify(&self.path, config);
        self
    }

    /// 设置请求体
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// 添加查询参数
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// 查询参数是否存在（值为空也算存在）
    pub fn has_query(&self, key: &str) -> bool {
        self.query.contains_key(key)
    }
}

/// 解析 `application/x-www-form-urlencoded` 查询串，键与值均已解码
fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// 响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Body {
    /// 空
    Empty,
    /// 纯文本
    Text(String),
    /// JSON
    Json(Value),
}

/// 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// 状态码
    pub status: u16,

    /// 响应头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// 响应体
    pub body: Body,
}

impl Response {
    /// 指定状态码与响应体
    pub fn new(status: u16, body: Body) -> Self {
        let mut headers = BTreeMap::new();
        match body {
            Body::Text(_) => {
                headers.insert("content-type".to_string(), "text/plain; charset=utf-8".to_string());
            }
            Body::Json(_) => {
                headers.insert("content-type".to_string(), "application/json".to_string());
            }
            Body::Empty => {}
        }
        Self {
            status,
            headers,
            body,
        }
    }

    /// 200 JSON 响应
    pub fn json(data: Value) -> Self {
        Self::new(status_code::OK, Body::Json(data))
    }

    /// 200 文本响应
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(status_code::OK, Body::Text(text.into()))
    }

    /// 204 空响应
    pub fn empty() -> Self {
        Self::new(status_code::NO_CONTENT, Body::Empty)
    }

    /// 按请求上下文生成 404：API 返回结构化错误，其余返回纯文本
    pub fn not_found(context: RequestContext, method: Method, path: &str) -> Self {
        let err = CmsError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        };
        Self::from_error(context, &err)
    }

    /// 按请求上下文把错误转换为响应
    pub fn from_error(context: RequestContext, err: &CmsError) -> Self {
        let status = err.status_code();
        match context {
            RequestContext::Api => Self::new(
                status,
                Body::Json(json!({
                    "error": {
                        "code": err.error_code(),
                        "message": err.to_string(),
                    }
                })),
            ),
            _ if status == status_code::NOT_FOUND => {
                Self::new(status, Body::Text("Not Found".to_string()))
            }
            _ => Self::new(status, Body::Text("Internal Server Error".to_string())),
        }
    }

    /// 设置响应头
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// 去掉响应体（HEAD 请求）
    pub fn without_body(mut self) -> Self {
        self.body = Body::Empty;
        self
    }

    /// 是否为 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
