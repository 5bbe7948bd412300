//! 分发器
//!
//! 在路由表中查找请求对应的路由并调用处理器，调用前后发布
//! `route.matched` 与 `route.dispatched` 通知。通知仅供观察，
//! 订阅者的错误会被记录并忽略，不影响分发结果。
//!
//! 处理器返回的错误不在这里转换，原样交给调用方。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::event::{topics, Event};
use super::event_bus::NotificationBus;
use super::request::{Method, Request, Response};
use super::route_table::{RouteMatch, RouteTable};
use crate::utils::Result;

/// 分发结果
#[derive(Debug)]
pub enum DispatchOutcome {
    /// 命中路由，处理器已返回
    Matched {
        /// 处理器响应（HEAD 请求已去掉响应体）
        response: Response,
        /// 命中的路由
        route: RouteMatch,
    },
    /// 没有匹配的路由，由调用方生成 404
    Unmatched,
}

impl DispatchOutcome {
    /// 是否命中
    pub fn is_matched(&self) -> bool {
        matches!(self, DispatchOutcome::Matched { .. })
    }

    /// 取出响应
    pub fn into_response(self) -> Option<Response> {
        match self {
            DispatchOutcome::Matched { response, .. } => Some(response),
            DispatchOutcome::Unmatched => None,
        }
    }
}

/// 分发统计
#[derive(Debug, Default)]
pub struct DispatchStats {
    matched: AtomicU64,
    unmatched: AtomicU64,
    failed: AtomicU64,
    total_latency_us: AtomicU64,
}

impl DispatchStats {
    fn record(&self, success: bool, latency_us: u64) {
        self.matched.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 获取统计快照
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        let matched = self.matched.load(Ordering::Relaxed);
        let total_latency = self.total_latency_us.load(Ordering::Relaxed);
        DispatchStatsSnapshot {
            matched,
            unmatched: self.unmatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            avg_latency_us: if matched > 0 { total_latency / matched } else { 0 },
        }
    }
}

/// 分发统计快照
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    /// 命中次数
    pub matched: u64,
    /// 未命中次数
    pub unmatched: u64,
    /// 处理器返回错误的次数
    pub failed: u64,
    /// 平均处理耗时（微秒）
    pub avg_latency_us: u64,
}

/// 分发器
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    bus: NotificationBus,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// 创建分发器
    pub fn new(routes: Arc<RouteTable>, bus: NotificationBus) -> Self {
        Self {
            routes,
            bus,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// 路由表
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// 分发请求
    #[instrument(skip(self, request), fields(request_id = %request.request_id, method = %request.method, path = %request.path))]
    pub async fn dispatch(&self, request: &Request) -> Result<DispatchOutcome> {
        let Some(route) = self.routes.find(request.method, &request.path).await else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!("没有匹配的路由");
            return Ok(DispatchOutcome::Unmatched);
        };

        self.observe(
            topics::ROUTE_MATCHED,
            json!({
                "request_id": request.request_id,
                "method": request.method,
                "path": request.path,
                "pattern": route.entry.pattern,
                "kind": route.entry.kind,
                "params": route.params,
            }),
        )
        .await;

        let start = Instant::now();
        let result = route.entry.handler.handle(request, &route.params).await;
        let latency_us = start.elapsed().as_micros() as u64;
        self.stats.record(result.is_ok(), latency_us);

        self.observe(
            topics::ROUTE_DISPATCHED,
            json!({
                "request_id": request.request_id,
                "method": request.method,
                "path": request.path,
                "pattern": route.entry.pattern,
                "params": route.params,
                "status": result.as_ref().map(|r| r.status).ok(),
                "ok": result.is_ok(),
                "latency_us": latency_us,
            }),
        )
        .await;

        let mut response = result?;
        if request.method == Method::Head {
            response = response.without_body();
        }

        debug!(pattern = %route.entry.pattern, status = response.status, "分发完成");
        Ok(DispatchOutcome::Matched { response, route })
    }

    /// 按方法与路径分发（上下文为默认值）
    pub async fn dispatch_path(&self, method: Method, path: &str) -> Result<DispatchOutcome> {
        self.dispatch(&Request::new(method, path)).await
    }

    async fn observe(&self, topic: &str, data: Value) {
        let mut event = Event::new(topic, data);
        if let Err(e) = self.bus.publish(&mut event).await {
            warn!(topic = %topic, error = %e, "观察通知失败，已忽略");
        }
    }

    /// 统计快照
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
