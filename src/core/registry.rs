//! 注册表
//!
//! 以名称为键的进程级存储：根目录、数据目录、已加载的控制器与插件实例等。
//! 值以 `Arc<dyn Any>` 保存，读取时按类型取回。

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::trace;

/// 根目录键
pub const ROOT_PATH: &str = "path.root";
/// 数据目录键
pub const DATA_PATH: &str = "path.data";

type Value = Arc<dyn Any + Send + Sync>;

/// 注册表
#[derive(Clone, Default)]
pub struct Registry {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Registry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并写入根目录与数据目录
    pub async fn with_paths(root: PathBuf, data: PathBuf) -> Self {
        let registry = Self::new();
        registry.set(ROOT_PATH, root).await;
        registry.set(DATA_PATH, data).await;
        registry
    }

    /// 写入值，已存在时覆盖
    pub async fn set<T>(&self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        trace!(name = %name, "注册表写入");
        self.values.write().await.insert(name, Arc::new(value));
    }

    /// 按类型读取值，名称不存在或类型不符时返回 None
    pub async fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.values.read().await.get(name).cloned()?;
        value.downcast::<T>().ok()
    }

    /// 是否存在
    pub async fn contains(&self, name: &str) -> bool {
        self.values.read().await.contains_key(name)
    }

    /// 移除值，返回是否存在
    pub async fn remove(&self, name: &str) -> bool {
        self.values.write().await.remove(name).is_some()
    }

    /// 以指定前缀开头的全部键（排序后）
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let values = self.values.read().await;
        let mut keys: Vec<String> = values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// 根目录
    pub async fn root_path(&self) -> Option<PathBuf> {
        self.get::<PathBuf>(ROOT_PATH).await.map(|p| (*p).clone())
    }

    /// 数据目录
    pub async fn data_path(&self) -> Option<PathBuf> {
        self.get::<PathBuf>(DATA_PATH).await.map(|p| (*p).clone())
    }

    /// 不持有存储的弱句柄
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            values: Arc::downgrade(&self.values),
        }
    }
}

/// 注册表弱句柄
///
/// 存放在注册表自身（或其所属内核）持有的对象中时使用。
#[derive(Clone, Default)]
pub struct WeakRegistry {
    values: Weak<RwLock<HashMap<String, Value>>>,
}

impl WeakRegistry {
    /// 注册表仍存活时取回强引用
    pub fn upgrade(&self) -> Option<Registry> {
        self.values.upgrade().map(|values| Registry { values })
    }
}

impl std::fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("alive", &(self.values.strong_count() > 0))
            .finish()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
