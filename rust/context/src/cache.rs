use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The level a cache write targets.
///
/// Reads traverse levels innermost-outermost (task, then module, then
/// pipeline); writes name their level explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Lives for the whole run; shared by all modules.
    Pipeline,
    /// Shared by all tasks in one module.
    Module,
    /// Shared by all steps in one task.
    Task,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pipeline => "pipeline",
            Self::Module => "module",
            Self::Task => "task",
        })
    }
}

/// A thread-safe keyed store for derived artifacts.
///
/// Values are [`serde_json::Value`] so heterogeneous entries share one
/// store; readers downcast at the edge through the typed getters. Last
/// write wins. Poisoned locks are recovered so a panic in one worker
/// does not block other readers.
#[derive(Default)]
pub struct Cache {
    inner: RwLock<IndexMap<String, Value>>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("Cache").field("entries", &inner.len()).finish()
    }
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for this key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.insert(key.into(), value);
    }

    /// Get a clone of the value for a key, or `None` if not present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.get(key).cloned()
    }

    /// Remove a key, returning its previous value if any.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.shift_remove(key)
    }

    /// Whether the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.contains_key(key)
    }

    /// Get a string value, if the key holds one.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Get an integer value, if the key holds a number fitting `i64`.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Get a boolean value, if the key holds one.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Return an independent snapshot of all current entries.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.len()
    }

    /// Whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three cache levels of one run, with module and task instances
/// created on demand and torn down explicitly when their scope ends.
#[derive(Debug, Default)]
pub struct ScopedCaches {
    pipeline: Arc<Cache>,
    modules: RwLock<IndexMap<String, Arc<Cache>>>,
    tasks: RwLock<IndexMap<String, Arc<Cache>>>,
}

impl ScopedCaches {
    /// Create the cache set for a fresh run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn task_key(module: &str, task: &str) -> String {
        format!("{module}/{task}")
    }

    /// The pipeline-level cache.
    #[must_use]
    pub fn pipeline(&self) -> Arc<Cache> {
        Arc::clone(&self.pipeline)
    }

    /// The cache for one module, created on first access.
    #[must_use]
    pub fn module(&self, module: &str) -> Arc<Cache> {
        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            modules
                .entry(module.to_string())
                .or_insert_with(|| Arc::new(Cache::new())),
        )
    }

    /// The cache for one task within a module, created on first access.
    #[must_use]
    pub fn task(&self, module: &str, task: &str) -> Arc<Cache> {
        let mut tasks = self
            .tasks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            tasks
                .entry(Self::task_key(module, task))
                .or_insert_with(|| Arc::new(Cache::new())),
        )
    }

    /// Tear down a module's cache and the caches of all its tasks.
    pub fn drop_module(&self, module: &str) {
        let mut modules = self
            .modules
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        modules.shift_remove(module);

        let prefix = format!("{module}/");
        let mut tasks = self
            .tasks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Tear down one task's cache.
    pub fn drop_task(&self, module: &str, task: &str) {
        let mut tasks = self
            .tasks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.shift_remove(&Self::task_key(module, task));
    }
}

/// A read-through view over the three levels for one (module, task)
/// scope.
///
/// `get` tries the task cache, then the module cache, then the
/// pipeline cache; `set` and `delete` name their level.
#[derive(Debug, Clone)]
pub struct CacheView {
    pipeline: Arc<Cache>,
    module: Arc<Cache>,
    task: Arc<Cache>,
}

impl CacheView {
    pub(crate) fn new(pipeline: Arc<Cache>, module: Arc<Cache>, task: Arc<Cache>) -> Self {
        Self {
            pipeline,
            module,
            task,
        }
    }

    fn level(&self, scope: CacheScope) -> &Cache {
        match scope {
            CacheScope::Pipeline => &self.pipeline,
            CacheScope::Module => &self.module,
            CacheScope::Task => &self.task,
        }
    }

    /// Read a key, innermost level first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.task
            .get(key)
            .or_else(|| self.module.get(key))
            .or_else(|| self.pipeline.get(key))
    }

    /// Read a string value, innermost level first.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Write a key at a specific level.
    pub fn set(&self, scope: CacheScope, key: impl Into<String>, value: Value) {
        self.level(scope).set(key, value);
    }

    /// Delete a key at a specific level.
    pub fn delete(&self, scope: CacheScope, key: &str) -> Option<Value> {
        self.level(scope).delete(key)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn writer_wins_within_a_level() {
        let cache = Cache::new();
        cache.set("k", json!("first"));
        cache.set("k", json!("second"));
        assert_eq!(cache.get_string("k"), Some("second".to_string()));
    }

    #[test]
    fn delete_removes_the_entry() {
        let cache = Cache::new();
        cache.set("k", json!(1));
        assert_eq!(cache.delete("k"), Some(json!(1)));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn view_reads_innermost_first() {
        let caches = ScopedCaches::new();
        caches.pipeline().set("k", json!("pipeline"));
        caches.module("etcd").set("k", json!("module"));

        let view = CacheView::new(
            caches.pipeline(),
            caches.module("etcd"),
            caches.task("etcd", "install"),
        );
        assert_eq!(view.get_string("k"), Some("module".to_string()));

        view.set(CacheScope::Task, "k", json!("task"));
        assert_eq!(view.get_string("k"), Some("task".to_string()));

        view.delete(CacheScope::Task, "k");
        assert_eq!(view.get_string("k"), Some("module".to_string()));
    }

    #[test]
    fn scoped_caches_are_shared_per_scope_name() {
        let caches = ScopedCaches::new();
        caches.task("etcd", "install").set("path", json!("/tmp/a"));
        assert_eq!(
            caches.task("etcd", "install").get_string("path"),
            Some("/tmp/a".to_string())
        );
        assert_eq!(caches.task("etcd", "bootstrap").get("path"), None);
    }

    #[test]
    fn drop_module_tears_down_its_task_caches() {
        let caches = ScopedCaches::new();
        caches.module("etcd").set("k", json!(1));
        caches.task("etcd", "install").set("k", json!(2));
        caches.drop_module("etcd");

        // Fresh instances after teardown.
        assert_eq!(caches.module("etcd").get("k"), None);
        assert_eq!(caches.task("etcd", "install").get("k"), None);
    }
}
