//! 通知事件数据结构
//!
//! 事件在一次发布中依次传给每个订阅者，订阅者可以修改 `data`，
//! 后续订阅者与发布者都能看到修改结果。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::short_id;

/// 内核发布的通知主题
pub mod topics {
    /// 路由已匹配，处理器调用之前
    ///
    /// 数据: `{request_id, method, path, pattern, kind, params}`
    pub const ROUTE_MATCHED: &str = "route.matched";

    /// 处理器已返回
    ///
    /// 数据: `{request_id, method, path, pattern, params, status, ok, latency_us}`
    pub const ROUTE_DISPATCHED: &str = "route.dispatched";

    /// 控制器加载完成
    ///
    /// 数据: `{controllers: [key, ...]}`
    pub const CONTROLLERS_LOADED: &str = "controllers.loaded";

    /// 插件加载完成
    ///
    /// 数据: `{plugins: [key, ...], context}`
    pub const PLUGINS_LOADED: &str = "plugins.loaded";

    /// 会话数据组装，插件可向 `menu` 数组追加菜单项
    pub const AUTH_SESSION_DATA: &str = "auth.session_data";

    /// 响应即将发送，数据为序列化后的响应，订阅者可修改
    pub const RESPONSE_BEFORE_SEND: &str = "response.before_send";

    /// 全部内置主题
    pub const ALL: [&str; 6] = [
        ROUTE_MATCHED,
        ROUTE_DISPATCHED,
        CONTROLLERS_LOADED,
        PLUGINS_LOADED,
        AUTH_SESSION_DATA,
        RESPONSE_BEFORE_SEND,
    ];
}

/// 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 主题（格式: category.name，如 route.matched）
    pub topic: String,

    /// 事件数据
    #[serde(default)]
    pub data: Value,

    /// 事件时间戳
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 创建新事件
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: short_id("evt"),
            topic: topic.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// 使用 Builder 模式构建事件
    pub fn builder(topic: impl Into<String>) -> EventBuilder {
        EventBuilder::new(topic)
    }

    /// 读取数据中的字段
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 写入数据字段；数据不是对象时先替换为空对象
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(ref mut map) = self.data {
            map.insert(key.into(), value);
        }
    }

    /// 向数组字段追加元素，字段不存在或不是数组时新建
    pub fn push(&mut self, key: &str, value: Value) {
        match self.data.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => self.set(key, Value::Array(vec![value])),
        }
    }
}

/// 事件构建器
#[derive(Debug)]
pub struct EventBuilder {
    topic: String,
    data: Map<String, Value>,
}

impl EventBuilder {
    /// 创建构建器
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            data: Map::new(),
        }
    }

    /// 添加数据字段
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// 构建事件
    pub fn build(self) -> Event {
        Event::new(self.topic, Value::Object(self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_creation() {
        let event = Event::new(topics::ROUTE_MATCHED, json!({"path": "/users"}));
        assert!(event.event_id.starts_with("evt_"));
        assert_eq!(event.topic, "route.matched");
        assert_eq!(event.get("path"), Some(&json!("/users")));
    }

    #[test]
    fn test_builder() {
        let event = Event::builder(topics::PLUGINS_LOADED)
            .field("plugins", json!(["seo"]))
            .field("context", "admin")
            .build();
        assert_eq!(event.data, json!({"plugins": ["seo"], "context": "admin"}));
    }

    #[test]
    fn test_push_creates_array() {
        let mut event = Event::new(topics::AUTH_SESSION_DATA, Value::Null);
        event.push("menu", json!({"title": "SEO"}));
        event.push("menu", json!({"title": "Forms"}));
        assert_eq!(event.data["menu"].as_array().map(Vec::len), Some(2));
    }
}
