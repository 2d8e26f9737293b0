use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Who started a query task: its workbench connection and local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOwner {
    pub connection_id: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    owners: HashMap<String, TaskOwner>,
    order: VecDeque<String>,
}

/// Bounded task id -> owner map; the oldest entries are evicted first
#[derive(Debug)]
pub struct TaskIndex {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TaskIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn record(&self, task_id: &str, owner: TaskOwner) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.owners.insert(task_id.to_string(), owner).is_none() {
            inner.order.push_back(task_id.to_string());
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.owners.remove(&oldest);
            }
        }
    }

    pub fn owner(&self, task_id: &str) -> Option<TaskOwner> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.owners.get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(conn: &str) -> TaskOwner {
        TaskOwner {
            connection_id: conn.into(),
            user_id: Some("U".into()),
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let index = TaskIndex::new(2);
        index.record("t1", owner("a"));
        index.record("t2", owner("b"));
        index.record("t3", owner("c"));

        assert_eq!(index.len(), 2);
        assert_eq!(index.owner("t1"), None);
        assert_eq!(index.owner("t3").unwrap().connection_id, "c");
    }

    #[test]
    fn rerecording_updates_without_growing() {
        let index = TaskIndex::new(2);
        index.record("t1", owner("a"));
        index.record("t1", owner("b"));
        index.record("t2", owner("c"));

        assert_eq!(index.len(), 2);
        assert_eq!(index.owner("t1").unwrap().connection_id, "b");
    }
}
