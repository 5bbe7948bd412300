//! 路由表
//!
//! 按请求方法分别维护：
//!
//! - 静态路由：字面路径精确匹配，每个 (方法, 路径) 至多一个
//! - 动态路由：含正则元字符的模式，编译为整串锚定匹配，按注册顺序尝试
//!
//! 动态路由的匹配结果放入 LRU 缓存，任何注册都会清空缓存。

use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::handler::SharedHandler;
use super::request::Method;
use crate::utils::{CmsError, Result};

/// 使模式成为动态路由的元字符
pub const DYNAMIC_METACHARACTERS: [char; 5] = ['[', '(', '*', '?', '+'];

/// 默认缓存容量
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// 路由类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// 精确匹配
    Static,
    /// 正则匹配
    Dynamic,
}

impl RouteKind {
    /// 根据模式是否包含正则元字符分类
    pub fn classify(pattern: &str) -> Self {
        if pattern.contains(&DYNAMIC_METACHARACTERS[..]) {
            RouteKind::Dynamic
        } else {
            RouteKind::Static
        }
    }

    /// 小写名称
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Static => "static",
            RouteKind::Dynamic => "dynamic",
        }
    }
}

/// 路由条目
#[derive(Clone)]
pub struct RouteEntry {
    /// 注册时的方法
    pub method: Method,
    /// 原始模式
    pub pattern: String,
    /// 路由类型
    pub kind: RouteKind,
    /// 注册该路由的控制器（可选）
    pub owner: Option<String>,
    /// 处理器
    pub handler: SharedHandler,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .finish()
    }
}

/// 一次成功的匹配
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// 命中的路由
    pub entry: RouteEntry,
    /// 位置捕获组（未参与匹配的组为空串）
    pub params: Vec<String>,
}

struct CompiledRoute {
    entry: RouteEntry,
    regex: Regex,
}

impl CompiledRoute {
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

// ============================================================================
// 动态路由缓存
// ============================================================================

/// 路由缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RouteCacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 条目数量
    pub size: usize,
    /// 容量
    pub capacity: usize,
}

#[derive(Debug, Clone)]
struct CachedMatch {
    list: Method,
    index: usize,
    params: Vec<String>,
}

/// 动态路由匹配缓存
///
/// 键为 (方法, 路径)，值为命中的动态路由位置与捕获组。
pub struct RouteCache {
    cache: Mutex<LruCache<(Method, String), CachedMatch>>,
    hits: AtomicU64,
    misses: AtomicU64,
    capacity: usize,
}

impl RouteCache {
    /// 创建新的路由缓存
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            capacity: capacity.get(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<(Method, String), CachedMatch>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, method: Method, path: &str) -> Option<CachedMatch> {
        let found = self.lock().get(&(method, path.to_string())).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    fn put(&self, method: Method, path: &str, value: CachedMatch) {
        self.lock().put((method, path.to_string()), value);
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 统计信息
    pub fn stats(&self) -> RouteCacheStats {
        RouteCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.lock().len(),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// 路由表
// ============================================================================

/// 路由导出信息（调试与命令行使用）
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    /// 方法
    pub method: Method,
    /// 模式
    pub pattern: String,
    /// 类型
    pub kind: RouteKind,
    /// 注册者
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl From<&RouteEntry> for RouteInfo {
    fn from(entry: &RouteEntry) -> Self {
        Self {
            method: entry.method,
            pattern: entry.pattern.clone(),
            kind: entry.kind,
            owner: entry.owner.clone(),
        }
    }
}

/// 路由表统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RouteTableStats {
    /// 静态路由数量
    pub static_route_count: usize,
    /// 动态路由数量
    pub dynamic_route_count: usize,
    /// 缓存统计（如果启用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_stats: Option<RouteCacheStats>,
}

/// 路由表
pub struct RouteTable {
    static_routes: RwLock<HashMap<Method, HashMap<String, RouteEntry>>>,
    dynamic_routes: RwLock<HashMap<Method, Vec<CompiledRoute>>>,
    cache: Option<RouteCache>,
}

impl RouteTable {
    /// 创建路由表（默认缓存容量）
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// 指定动态路由缓存容量，0 表示不缓存
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            static_routes: RwLock::new(HashMap::new()),
            dynamic_routes: RwLock::new(HashMap::new()),
            cache: (capacity > 0).then(|| RouteCache::new(capacity)),
        }
    }

    /// 注册路由
    pub async fn register(
        &self,
        method: Method,
        pattern: &str,
        handler: SharedHandler,
    ) -> Result<RouteKind> {
        self.register_entry(method, pattern, handler, None).await
    }

    /// 注册路由并记录注册者
    pub async fn register_entry(
        &self,
        method: Method,
        pattern: &str,
        handler: SharedHandler,
        owner: Option<String>,
    ) -> Result<RouteKind> {
        let kind = RouteKind::classify(pattern);
        let entry = RouteEntry {
            method,
            pattern: pattern.to_string(),
            kind,
            owner,
            handler,
        };

        match kind {
            RouteKind::Static => {
                let mut routes = self.static_routes.write().await;
                let by_path = routes.entry(method).or_default();
                if by_path.contains_key(pattern) {
                    return Err(CmsError::RouteAlreadyExists {
                        method: method.to_string(),
                        path: pattern.to_string(),
                    });
                }
                by_path.insert(pattern.to_string(), entry);
            }
            RouteKind::Dynamic => {
                let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    CmsError::InvalidRoutePattern {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let mut routes = self.dynamic_routes.write().await;
                routes
                    .entry(method)
                    .or_default()
                    .push(CompiledRoute { entry, regex });
            }
        }

        if let Some(ref cache) = self.cache {
            cache.clear();
        }

        debug!(method = %method, pattern = %pattern, kind = kind.as_str(), "注册路由");
        Ok(kind)
    }

    /// 查找路由
    ///
    /// 顺序：静态[方法] → (HEAD) 静态[GET] → 动态[方法] → (HEAD) 动态[GET]。
    pub async fn find(&self, method: Method, path: &str) -> Option<RouteMatch> {
        let lists = Self::candidate_methods(method);

        {
            let static_routes = self.static_routes.read().await;
            for list in lists {
                if let Some(entry) = static_routes.get(list).and_then(|m| m.get(path)) {
                    trace!(method = %method, path = %path, "命中静态路由");
                    return Some(RouteMatch {
                        entry: entry.clone(),
                        params: Vec::new(),
                    });
                }
            }
        }

        let dynamic_routes = self.dynamic_routes.read().await;

        if let Some(ref cache) = self.cache {
            if let Some(cached) = cache.get(method, path) {
                if let Some(route) = dynamic_routes
                    .get(&cached.list)
                    .and_then(|routes| routes.get(cached.index))
                {
                    return Some(RouteMatch {
                        entry: route.entry.clone(),
                        params: cached.params,
                    });
                }
            }
        }

        for list in lists {
            let Some(routes) = dynamic_routes.get(list) else {
                continue;
            };
            for (index, route) in routes.iter().enumerate() {
                if let Some(params) = route.captures(path) {
                    trace!(
                        method = %method,
                        path = %path,
                        pattern = %route.entry.pattern,
                        "命中动态路由"
                    );
                    if let Some(ref cache) = self.cache {
                        cache.put(
                            method,
                            path,
                            CachedMatch {
                                list: *list,
                                index,
                                params: params.clone(),
                            },
                        );
                    }
                    return Some(RouteMatch {
                        entry: route.entry.clone(),
                        params,
                    });
                }
            }
        }

        None
    }

    fn candidate_methods(method: Method) -> &'static [Method] {
        const GET: [Method; 1] = [Method::Get];
        const POST: [Method; 1] = [Method::Post];
        const PUT: [Method; 1] = [Method::Put];
        const PATCH: [Method; 1] = [Method::Patch];
        const DELETE: [Method; 1] = [Method::Delete];
        const HEAD: [Method; 2] = [Method::Head, Method::Get];
        match method {
            Method::Get => &GET,
            Method::Post => &POST,
            Method::Put => &PUT,
            Method::Patch => &PATCH,
            Method::Delete => &DELETE,
            Method::Head => &HEAD,
        }
    }

    /// 导出全部路由：按方法排列，静态路由按路径排序，动态路由保持注册顺序
    pub async fn export(&self) -> Vec<RouteInfo> {
        let static_routes = self.static_routes.read().await;
        let dynamic_routes = self.dynamic_routes.read().await;

        let mut routes = Vec::new();
        for method in Method::ALL {
            if let Some(by_path) = static_routes.get(&method) {
                let mut entries: Vec<&RouteEntry> = by_path.values().collect();
                entries.sort_by(|a, b| a.pattern.cmp(&b.pattern));
                routes.extend(entries.into_iter().map(RouteInfo::from));
            }
            if let Some(list) = dynamic_routes.get(&method) {
                routes.extend(list.iter().map(|c| RouteInfo::from(&c.entry)));
            }
        }
        routes
    }

    /// 统计信息
    pub async fn stats(&self) -> RouteTableStats {
        let static_routes = self.static_routes.read().await;
        let dynamic_routes = self.dynamic_routes.read().await;
        RouteTableStats {
            static_route_count: static_routes.values().map(HashMap::len).sum(),
            dynamic_route_count: dynamic_routes.values().map(Vec::len).sum(),
            cache_stats: self.cache.as_ref().map(RouteCache::stats),
        }
    }

    /// 缓存统计
    pub fn cache_stats(&self) -> Option<RouteCacheStats> {
        self.cache.as_ref().map(RouteCache::stats)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("cache", &self.cache_stats())
            .finish_non_exhaustive()
    }
}
