use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// 运行中评测进程的句柄，只在任务处于 running 时存在
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    /// 触发后由监管单元结束子进程
    pub kill: CancellationToken,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            kill: CancellationToken::new(),
        }
    }
}

/// 任务ID到进程句柄的映射。
/// 先移除句柄的一方负责写入任务终态。
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    handles: Mutex<HashMap<String, ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, task_id: &str, handle: ProcessHandle) {
        self.handles.lock().await.insert(task_id.to_string(), handle);
    }

    pub async fn remove(&self, task_id: &str) -> Option<ProcessHandle> {
        self.handles.lock().await.remove(task_id)
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.handles.lock().await.contains_key(task_id)
    }

    pub async fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn drain(&self) -> Vec<(String, ProcessHandle)> {
        self.handles.lock().await.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_one_remover_wins() {
        let registry = ProcessRegistry::new();
        registry.register("t1", ProcessHandle::new(Some(42))).await;

        let first = registry.remove("t1").await;
        let second = registry.remove("t1").await;
        assert_eq!(first.and_then(|h| h.pid), Some(42));
        assert!(second.is_none());
        assert!(!registry.contains("t1").await);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = ProcessRegistry::new();
        registry.register("b", ProcessHandle::new(None)).await;
        registry.register("a", ProcessHandle::new(None)).await;
        assert_eq!(registry.task_ids().await, vec!["a", "b"]);

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.task_ids().await.is_empty());
    }
}
