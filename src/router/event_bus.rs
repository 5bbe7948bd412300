//! 通知总线
//!
//! 按主题注册回调，发布时按优先级升序同步调用（数值越小越先执行，
//! 相同优先级保持订阅顺序）。订阅在进程生命周期内不会移除。
//!
//! 任一回调返回错误会中止本次发布，剩余订阅者不再调用，错误返回给发布者。
//!
//! # 使用示例
//!
//! ```
//! use cms_core::router::{Event, NotificationBus, DEFAULT_PRIORITY};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> cms_core::Result<()> {
//! let bus = NotificationBus::new();
//! bus.subscribe("audit", "route.matched", DEFAULT_PRIORITY, |event| {
//!     event.set("seen", json!(true));
//!     Ok(())
//! })
//! .await;
//!
//! let event = bus.notify("route.matched", json!({"path": "/"})).await?;
//! assert_eq!(event.data["seen"], json!(true));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::router::event::Event;
use crate::utils::{short_id, CmsError, Result};

/// 默认优先级
pub const DEFAULT_PRIORITY: i32 = 10;

/// 通知回调
///
/// 回调可以修改事件数据；返回错误会中止本次发布。
pub type NotificationCallback = Arc<dyn Fn(&mut Event) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct SubscriptionEntry {
    subscription_id: String,
    subscriber: String,
    priority: i32,
    callback: NotificationCallback,
    subscribed_at: DateTime<Utc>,
}

/// 订阅信息（调试导出）
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// 订阅唯一标识
    pub subscription_id: String,
    /// 订阅者
    pub subscriber: String,
    /// 主题
    pub topic: String,
    /// 优先级
    pub priority: i32,
    /// 订阅时间
    pub subscribed_at: DateTime<Utc>,
}

/// 发布统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    /// 发布次数
    pub published: u64,
    /// 回调调用次数
    pub delivered: u64,
    /// 被回调错误中止的发布次数
    pub aborted: u64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    aborted: AtomicU64,
}

/// 通知总线
#[derive(Clone, Default)]
pub struct NotificationBus {
    /// 主题 -> 已按优先级排好序的订阅列表
    subscriptions: Arc<RwLock<HashMap<String, Vec<SubscriptionEntry>>>>,
    counters: Arc<BusCounters>,
}

impl NotificationBus {
    /// 创建空总线
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅主题，返回订阅 ID
    pub async fn subscribe<F>(
        &self,
        subscriber: impl Into<String>,
        topic: impl Into<String>,
        priority: i32,
        callback: F,
    ) -> String
    where
        F: Fn(&mut Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_arc(subscriber, topic, priority, Arc::new(callback))
            .await
    }

    /// 使用共享回调订阅
    pub async fn subscribe_arc(
        &self,
        subscriber: impl Into<String>,
        topic: impl Into<String>,
        priority: i32,
        callback: NotificationCallback,
    ) -> String {
        let topic = topic.into();
        let entry = SubscriptionEntry {
            subscription_id: short_id("sub"),
            subscriber: subscriber.into(),
            priority,
            callback,
            subscribed_at: Utc::now(),
        };
        let subscription_id = entry.subscription_id.clone();

        debug!(
            subscription_id = %subscription_id,
            subscriber = %entry.subscriber,
            topic = %topic,
            priority,
            "添加订阅"
        );

        let mut subscriptions = self.subscriptions.write().await;
        let list = subscriptions.entry(topic).or_default();
        list.push(entry);
        // 稳定排序：相同优先级保持订阅顺序
        list.sort_by_key(|e| e.priority);

        subscription_id
    }

    /// 发布事件，返回被调用的订阅者数量
    pub async fn publish(&self, event: &mut Event) -> Result<usize> {
        // 先复制订阅列表再调用回调，回调内可以安全地访问总线
        let entries = {
            let subscriptions = self.subscriptions.read().await;
            match subscriptions.get(&event.topic) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => {
                    trace!(topic = %event.topic, "主题没有订阅者");
                    return Ok(0);
                }
            }
        };

        self.counters.published.fetch_add(1, Ordering::Relaxed);

        for (delivered, entry) in entries.iter().enumerate() {
            trace!(
                topic = %event.topic,
                subscriber = %entry.subscriber,
                priority = entry.priority,
                "调用订阅者"
            );
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);

            if let Err(e) = (entry.callback)(event) {
                self.counters.aborted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    topic = %event.topic,
                    subscriber = %entry.subscriber,
                    skipped = entries.len() - delivered - 1,
                    error = %e,
                    "订阅者返回错误，中止发布"
                );
                return Err(CmsError::SubscriberFailed {
                    subscriber: entry.subscriber.clone(),
                    topic: event.topic.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(entries.len())
    }

    /// 以主题和数据发布，返回（可能被修改过的）事件
    pub async fn notify(&self, topic: &str, data: Value) -> Result<Event> {
        let mut event = Event::new(topic, data);
        self.publish(&mut event).await?;
        Ok(event)
    }

    /// 主题的订阅者数量
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 全部订阅（按主题名、再按执行顺序）
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let subscriptions = self.subscriptions.read().await;
        let mut topics: Vec<&String> = subscriptions.keys().collect();
        topics.sort();

        topics
            .into_iter()
            .flat_map(|topic| {
                subscriptions[topic].iter().map(move |e| SubscriptionInfo {
                    subscription_id: e.subscription_id.clone(),
                    subscriber: e.subscriber.clone(),
                    topic: topic.clone(),
                    priority: e.priority,
                    subscribed_at: e.subscribed_at,
                })
            })
            .collect()
    }

    /// 发布统计
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            aborted: self.counters.aborted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = NotificationBus::new();
        let mut event = Event::new("nobody.listens", json!({"x": 1}));
        assert_eq!(bus.publish(&mut event).await.unwrap(), 0);
        assert_eq!(event.data, json!({"x": 1}));
        assert_eq!(bus.stats().published, 0);
    }

    #[tokio::test]
    async fn test_priority_order() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for priority in [20, 5, 10] {
            let order = order.clone();
            bus.subscribe("test", "t", priority, move |_| {
                order.lock().unwrap().push(priority);
                Ok(())
            })
            .await;
        }

        bus.notify("t", Value::Null).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![5, 10, 20]);
    }

    #[tokio::test]
    async fn test_ties_keep_subscription_order() {
        let bus = NotificationBus::new();
        for name in ["first", "second", "third"] {
            bus.subscribe(name, "t", DEFAULT_PRIORITY, move |event| {
                event.push("seen", json!(name));
                Ok(())
            })
            .await;
        }

        let event = bus.notify("t", json!({})).await.unwrap();
        assert_eq!(event.data["seen"], json!(["first", "second", "third"]));
    }

    #[tokio::test]
    async fn test_error_aborts_remaining_subscribers() {
        let bus = NotificationBus::new();
        let calls = Arc::new(AtomicU64::new(0));

        let c = calls.clone();
        bus.subscribe("ok", "t", 1, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        bus.subscribe("bad", "t", 2, |_| Err(CmsError::Internal("boom".to_string())))
            .await;
        let c = calls.clone();
        bus.subscribe("late", "t", 3, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        let err = bus.notify("t", Value::Null).await.unwrap_err();
        match err {
            CmsError::SubscriberFailed { subscriber, topic, .. } => {
                assert_eq!(subscriber, "bad");
                assert_eq!(topic, "t");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().aborted, 1);
    }

    #[tokio::test]
    async fn test_subscriber_count_and_listing() {
        let bus = NotificationBus::new();
        bus.subscribe("a", "x.one", 10, |_| Ok(())).await;
        bus.subscribe("b", "x.one", 1, |_| Ok(())).await;
        bus.subscribe("c", "a.two", 10, |_| Ok(())).await;

        assert_eq!(bus.subscriber_count("x.one").await, 2);
        assert_eq!(bus.subscriber_count("missing").await, 0);

        let listed: Vec<(String, String)> = bus
            .subscriptions()
            .await
            .into_iter()
            .map(|s| (s.topic, s.subscriber))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("a.two".to_string(), "c".to_string()),
                ("x.one".to_string(), "b".to_string()),
                ("x.one".to_string(), "a".to_string()),
            ]
        );
    }
}
