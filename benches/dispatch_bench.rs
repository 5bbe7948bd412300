//! 分发性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 静态路由查找
//! - 动态路由查找（有无匹配缓存）
//! - 完整分发流程
//! - 通知发布

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cms_core::router::{handler_fn, Dispatcher, Method, NotificationBus, Request, Response, RouteTable};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// 测试辅助
// ============================================================================

/// 注册 `size` 条静态路由与 `size` 条动态路由
async fn populated_table(size: usize, cache_capacity: usize) -> RouteTable {
    let table = RouteTable::with_cache_capacity(cache_capacity);
    for i in 0..size {
        let handler = handler_fn(|_, _| Ok(Response::text("ok")));
        table
            .register(Method::Get, &format!("/section{}/index", i), handler.clone())
            .await
            .unwrap();
        table
            .register(Method::Get, &format!("/section{}/([0-9]+)", i), handler)
            .await
            .unwrap();
    }
    table
}

// ============================================================================
// 路由查找基准测试
// ============================================================================

/// 静态路由查找（哈希表）
fn static_lookup_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let table = rt.block_on(populated_table(100, 256));

    c.bench_function("route_table_static_lookup", |b| {
        b.to_async(&rt).iter(|| async {
            table.find(Method::Get, black_box("/section50/index")).await
        });
    });
}

/// 动态路由查找：逐条匹配与命中缓存的对比
fn dynamic_lookup_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("route_table_dynamic_lookup");

    for size in [10, 100, 500].iter() {
        let uncached = rt.block_on(populated_table(*size, 0));
        let cached = rt.block_on(populated_table(*size, 256));
        let path = format!("/section{}/42", size - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("scan", size), &path, |b, path| {
            b.to_async(&rt)
                .iter(|| async { uncached.find(Method::Get, black_box(path)).await });
        });
        group.bench_with_input(BenchmarkId::new("cached", size), &path, |b, path| {
            b.to_async(&rt)
                .iter(|| async { cached.find(Method::Get, black_box(path)).await });
        });
    }

    group.finish();
}

// ============================================================================
// 分发基准测试
// ============================================================================

/// 完整分发流程（查找、通知、处理器调用）
fn dispatch_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let table = Arc::new(rt.block_on(populated_table(100, 256)));
    let quiet = Dispatcher::new(table.clone(), NotificationBus::new());

    let observed_bus = NotificationBus::new();
    rt.block_on(async {
        for topic in ["route.matched", "route.dispatched"] {
            observed_bus
                .subscribe("bench", topic, 10, |_| Ok(()))
                .await;
        }
    });
    let observed = Dispatcher::new(table, observed_bus);
    let request = Request::new(Method::Get, "/section7/1234");

    let mut group = c.benchmark_group("dispatch");
    group.bench_function("no_subscribers", |b| {
        b.to_async(&rt).iter(|| async { quiet.dispatch(black_box(&request)).await });
    });
    group.bench_function("with_subscribers", |b| {
        b.to_async(&rt)
            .iter(|| async { observed.dispatch(black_box(&request)).await });
    });
    group.bench_function("unmatched", |b| {
        b.to_async(&rt)
            .iter(|| async { quiet.dispatch_path(Method::Get, black_box("/missing")).await });
    });
    group.finish();
}

// ============================================================================
// 通知基准测试
// ============================================================================

/// 不同订阅者数量下的发布性能
fn notify_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("notification_bus_notify");

    for count in [1, 10, 50].iter() {
        let bus = NotificationBus::new();
        rt.block_on(async {
            for i in 0..*count {
                bus.subscribe(format!("sub{}", i), "bench.topic", i as i32, |event| {
                    event.set("touched", Value::Bool(true));
                    Ok(())
                })
                .await;
            }
        });

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.to_async(&rt).iter(|| async {
                bus.notify("bench.topic", black_box(json!({ "id": 1 }))).await
            });
        });
    }

    group.finish();
}

criterion_group!(
    name = lookup_benches;
    config = Criterion::default().sample_size(100);
    targets = static_lookup_benchmark, dynamic_lookup_benchmark
);

criterion_group!(
    name = dispatch_benches;
    config = Criterion::default().sample_size(50);
    targets = dispatch_benchmark, notify_benchmark
);

criterion_main!(lookup_benches, dispatch_benches);
