//! Task registry: cancellable handles for in-flight work units, per user.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BatchError;
use crate::worker::state::TaskId;

/// Cancellable reference to a running work unit.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub user_id: String,
    pub batch_id: Uuid,
    pub registered_at: DateTime<Utc>,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new(
        id: TaskId,
        user_id: impl Into<String>,
        batch_id: Uuid,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            batch_id,
            registered_at: Utc::now(),
            token,
        }
    }

    /// Token the unit's execution path listens on.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation. Returns `false` if already requested.
    fn cancel(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }
}

type UserTasks = Mutex<HashMap<TaskId, TaskHandle>>;

/// Owns the set of in-flight tasks keyed by (user, task id).
///
/// Each user has its own lock. The outer map is only write-locked when a user
/// gets their first active handle or loses their last one, so idle users do
/// not accumulate.
pub struct TaskRegistry {
    users: RwLock<HashMap<String, Arc<UserTasks>>>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh task id.
    pub fn next_task_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn user(&self, user_id: &str) -> Option<Arc<UserTasks>> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Add a handle. Fails if the user already has a handle with the same id.
    pub async fn register(&self, handle: TaskHandle) -> Result<(), BatchError> {
        // The outer lock is held until the handle is in place, so a concurrent
        // prune cannot drop the map it lands in.
        {
            let users = self.users.read().await;
            if let Some(tasks) = users.get(&handle.user_id) {
                return insert_handle(&mut *tasks.lock().await, handle);
            }
        }
        let mut users = self.users.write().await;
        let tasks = users.entry(handle.user_id.clone()).or_default();
        insert_handle(&mut *tasks.lock().await, handle)
    }

    /// Signal cancellation on every active handle of `user_id`.
    ///
    /// Does not wait for the units to stop. Returns how many handles were
    /// newly signalled.
    pub async fn cancel_all(&self, user_id: &str) -> usize {
        let Some(tasks) = self.user(user_id).await else {
            return 0;
        };
        let tasks = tasks.lock().await;
        let cancelled = tasks.values().filter(|h| h.cancel()).count();
        if cancelled > 0 {
            tracing::info!(user_id, cancelled, "Cancelled active tasks");
        }
        cancelled
    }

    /// Signal one handle. Returns `false` if it is not registered.
    pub async fn cancel_one(&self, user_id: &str, task_id: TaskId) -> bool {
        let Some(tasks) = self.user(user_id).await else {
            return false;
        };
        let tasks = tasks.lock().await;
        match tasks.get(&task_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a resolved unit's handle. A second call is a no-op.
    pub async fn deregister(&self, user_id: &str, task_id: TaskId) {
        let Some(tasks) = self.user(user_id).await else {
            return;
        };
        let now_idle = {
            let mut tasks = tasks.lock().await;
            tasks.remove(&task_id);
            tasks.is_empty()
        };
        if now_idle {
            self.prune(user_id).await;
        }
    }

    /// Drop a user's map if it is still empty.
    async fn prune(&self, user_id: &str) {
        let mut users = self.users.write().await;
        let idle = match users.get(user_id) {
            Some(tasks) => tasks.lock().await.is_empty(),
            None => false,
        };
        if idle {
            users.remove(user_id);
        }
    }

    /// Get a copy of a registered handle.
    pub async fn get(&self, user_id: &str, task_id: TaskId) -> Option<TaskHandle> {
        let tasks = self.user(user_id).await?;
        let tasks = tasks.lock().await;
        tasks.get(&task_id).cloned()
    }

    /// Number of active handles for a user.
    pub async fn active_count(&self, user_id: &str) -> usize {
        match self.user(user_id).await {
            Some(tasks) => tasks.lock().await.len(),
            None => 0,
        }
    }

    /// Active handle counts for every user with at least one active task.
    pub async fn active_users(&self) -> Vec<(String, usize)> {
        let users: Vec<(String, Arc<UserTasks>)> = self
            .users
            .read()
            .await
            .iter()
            .map(|(id, tasks)| (id.clone(), Arc::clone(tasks)))
            .collect();

        let mut counts = Vec::with_capacity(users.len());
        for (user_id, tasks) in users {
            let count = tasks.lock().await.len();
            if count > 0 {
                counts.push((user_id, count));
            }
        }
        counts.sort();
        counts
    }

    /// Total active handles across all users.
    pub async fn total_active(&self) -> usize {
        self.active_users().await.iter().map(|(_, n)| n).sum()
    }
}

fn insert_handle(
    tasks: &mut HashMap<TaskId, TaskHandle>,
    handle: TaskHandle,
) -> Result<(), BatchError> {
    if tasks.contains_key(&handle.id) {
        tracing::warn!(
            user_id = %handle.user_id,
            task_id = handle.id,
            "Duplicate task registration"
        );
        return Err(BatchError::DuplicateTask {
            user_id: handle.user_id,
            task_id: handle.id,
        });
    }
    tasks.insert(handle.id, handle);
    Ok(())
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(registry: &TaskRegistry, user: &str) -> TaskHandle {
        TaskHandle::new(
            registry.next_task_id(),
            user,
            Uuid::new_v4(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn task_ids_increase() {
        let registry = TaskRegistry::new();
        let a = registry.next_task_id();
        let b = registry.next_task_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn register_and_count() {
        let registry = TaskRegistry::new();
        registry.register(handle(&registry, "alice")).await.unwrap();
        registry.register(handle(&registry, "alice")).await.unwrap();
        registry.register(handle(&registry, "bob")).await.unwrap();

        assert_eq!(registry.active_count("alice").await, 2);
        assert_eq!(registry.active_count("bob").await, 1);
        assert_eq!(registry.active_count("carol").await, 0);
        assert_eq!(registry.total_active().await, 3);
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let registry = TaskRegistry::new();
        let h = handle(&registry, "alice");
        registry.register(h.clone()).await.unwrap();

        let result = registry.register(h.clone()).await;
        assert_eq!(
            result,
            Err(BatchError::DuplicateTask {
                user_id: "alice".into(),
                task_id: h.id,
            })
        );
        assert_eq!(registry.active_count("alice").await, 1);
    }

    #[tokio::test]
    async fn same_id_different_users_allowed() {
        let registry = TaskRegistry::new();
        let token = CancellationToken::new();
        let batch = Uuid::new_v4();
        registry
            .register(TaskHandle::new(9, "alice", batch, token.clone()))
            .await
            .unwrap();
        registry
            .register(TaskHandle::new(9, "bob", batch, token))
            .await
            .unwrap();
        assert_eq!(registry.total_active().await, 2);
    }

    #[tokio::test]
    async fn cancel_all_signals_without_removing() {
        let registry = TaskRegistry::new();
        let a = handle(&registry, "alice");
        let b = handle(&registry, "alice");
        let other = handle(&registry, "bob");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();
        registry.register(other.clone()).await.unwrap();

        assert_eq!(registry.cancel_all("alice").await, 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!other.is_cancelled());
        assert_eq!(registry.active_count("alice").await, 2);

        // Already signalled
        assert_eq!(registry.cancel_all("alice").await, 0);
    }

    #[tokio::test]
    async fn cancel_all_idle_user_is_idempotent() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.cancel_all("nobody").await, 0);
        assert_eq!(registry.cancel_all("nobody").await, 0);
    }

    #[tokio::test]
    async fn cancel_one() {
        let registry = TaskRegistry::new();
        let a = handle(&registry, "alice");
        let b = handle(&registry, "alice");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();

        assert!(registry.cancel_one("alice", a.id).await);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!registry.cancel_one("alice", 9999).await);
        assert!(!registry.cancel_one("bob", a.id).await);
    }

    #[tokio::test]
    async fn deregister_twice_is_noop() {
        let registry = TaskRegistry::new();
        let h = handle(&registry, "alice");
        registry.register(h.clone()).await.unwrap();

        registry.deregister("alice", h.id).await;
        registry.deregister("alice", h.id).await;
        registry.deregister("ghost", h.id).await;
        assert_eq!(registry.active_count("alice").await, 0);
        assert!(registry.get("alice", h.id).await.is_none());
    }

    #[tokio::test]
    async fn active_users_skips_idle() {
        let registry = TaskRegistry::new();
        let h = handle(&registry, "alice");
        registry.register(h.clone()).await.unwrap();
        registry.register(handle(&registry, "bob")).await.unwrap();
        registry.deregister("alice", h.id).await;

        assert_eq!(registry.active_users().await, vec![("bob".to_string(), 1)]);
    }

    #[tokio::test]
    async fn idle_users_are_pruned() {
        let registry = TaskRegistry::new();
        let a = handle(&registry, "alice");
        let b = handle(&registry, "alice");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();

        registry.deregister("alice", a.id).await;
        assert!(registry.users.read().await.contains_key("alice"));
        registry.deregister("alice", b.id).await;
        assert!(registry.users.read().await.is_empty());

        // A returning user starts a fresh map
        registry.register(handle(&registry, "alice")).await.unwrap();
        assert_eq!(registry.active_count("alice").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_deregister_consistent() {
        let registry = Arc::new(TaskRegistry::new());
        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            joins.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let h = handle(&registry, "alice");
                    registry.register(h.clone()).await.unwrap();
                    registry.deregister("alice", h.id).await;
                }
            }));
        }
        for join in joins {
            join.await.unwrap();
        }
        assert_eq!(registry.active_count("alice").await, 0);
        assert!(registry.users.read().await.is_empty());
    }
}
