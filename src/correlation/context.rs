//! Current-id carrier and scoped execution.

use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::correlation::id::{CorrelationError, CorrelationId};

tokio::task_local! {
    static TASK_SCOPE: RefCell<Option<CorrelationId>>;
}

/// Holds the current correlation id for one logical execution context.
///
/// Cloning yields a handle to the same slot. Inside a task scope opened by
/// [`CorrelationContext::run_with_async`], reads and writes go to that task's
/// own slot instead, so concurrent tasks stay isolated.
#[derive(Debug, Clone, Default)]
pub struct CorrelationContext {
    current: Arc<Mutex<Option<CorrelationId>>>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current id, if any.
    pub fn get(&self) -> Option<CorrelationId> {
        if let Ok(scoped) = TASK_SCOPE.try_with(|slot| *slot.borrow()) {
            return scoped;
        }
        *self.current.lock().expect("correlation mutex poisoned")
    }

    /// The current id, or a freshly generated one (not stored).
    pub fn current_or_generate(&self) -> CorrelationId {
        self.get().unwrap_or_else(CorrelationId::generate)
    }

    /// Validate and install `id` as current.
    pub fn set(&self, id: &str) -> Result<(), CorrelationError> {
        let id = CorrelationId::parse(id)?;
        self.set_id(id);
        Ok(())
    }

    pub fn set_id(&self, id: CorrelationId) {
        self.replace(Some(id));
    }

    /// Forget the current id. No-op when already clear.
    pub fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, value: Option<CorrelationId>) -> Option<CorrelationId> {
        if let Ok(previous) = TASK_SCOPE.try_with(|slot| slot.replace(value)) {
            return previous;
        }
        let mut current = self.current.lock().expect("correlation mutex poisoned");
        std::mem::replace(&mut *current, value)
    }

    /// Run `f` with `id` as current, restoring the previous id afterwards.
    ///
    /// Restoration also happens if `f` panics; the panic continues after.
    pub fn run_with<F, R>(&self, id: CorrelationId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let previous = self.replace(Some(id));
        let _restore = RestoreGuard { ctx: self, previous };
        f()
    }

    /// Run a future with `id` as current for that task only.
    ///
    /// The id is visible to everything the future awaits, and is gone once it
    /// completes or is dropped. Other tasks keep seeing their own value.
    pub async fn run_with_async<F>(&self, id: CorrelationId, fut: F) -> F::Output
    where
        F: Future,
    {
        TASK_SCOPE.scope(RefCell::new(Some(id)), fut).await
    }
}

struct RestoreGuard<'a> {
    ctx: &'a CorrelationContext,
    previous: Option<CorrelationId>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.ctx.replace(self.previous.take());
    }
}

/// Stateful helper over a context that also hands out child ids.
#[derive(Debug, Clone, Default)]
pub struct CorrelationManager {
    context: CorrelationContext,
}

impl CorrelationManager {
    pub fn new(context: CorrelationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &CorrelationContext {
        &self.context
    }

    /// Generate a new id and make it current.
    pub fn start(&self) -> CorrelationId {
        let id = CorrelationId::generate();
        self.context.set_id(id);
        id
    }

    /// New id sharing the current id's first segment. Without a current id
    /// this is a plain fresh id.
    pub fn create_child(&self) -> CorrelationId {
        match self.context.get() {
            Some(parent) => parent.child(),
            None => CorrelationId::generate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_set_get_clear() {
        let ctx = CorrelationContext::new();
        assert!(ctx.get().is_none());

        let id = CorrelationId::generate();
        ctx.set(&id.to_string()).unwrap();
        assert_eq!(ctx.get(), Some(id));

        ctx.clear();
        ctx.clear();
        assert!(ctx.get().is_none());
    }

    #[test]
    fn test_set_rejects_invalid() {
        let ctx = CorrelationContext::new();
        let id = CorrelationId::generate();
        ctx.set_id(id);
        assert!(ctx.set("bogus").is_err());
        assert_eq!(ctx.get(), Some(id), "failed set must not change state");
    }

    #[test]
    fn test_run_with_restores_previous() {
        let ctx = CorrelationContext::new();
        let outer = CorrelationId::generate();
        let inner = CorrelationId::generate();
        ctx.set_id(outer);

        let seen = ctx.run_with(inner, || ctx.get());
        assert_eq!(seen, Some(inner));
        assert_eq!(ctx.get(), Some(outer));
    }

    #[test]
    fn test_run_with_clears_when_nothing_before() {
        let ctx = CorrelationContext::new();
        let result: Result<(), &str> = ctx.run_with(CorrelationId::generate(), || Err("boom"));
        assert!(result.is_err());
        assert!(ctx.get().is_none());
    }

    #[test]
    fn test_run_with_restores_on_panic() {
        let ctx = CorrelationContext::new();
        let outer = CorrelationId::generate();
        ctx.set_id(outer);

        let result = catch_unwind(AssertUnwindSafe(|| {
            ctx.run_with(CorrelationId::generate(), || panic!("inner failure"))
        }));
        assert!(result.is_err());
        assert_eq!(ctx.get(), Some(outer));
    }

    #[tokio::test]
    async fn test_async_scope_is_task_local() {
        let ctx = CorrelationContext::new();
        let base = CorrelationId::generate();
        ctx.set_id(base);

        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        let ctx_a = ctx.clone();
        let ctx_b = ctx.clone();

        let task_a = tokio::spawn(async move {
            let inner = ctx_a.clone();
            ctx_a
                .run_with_async(a, async move {
                    tokio::task::yield_now().await;
                    inner.get()
                })
                .await
        });
        let task_b = tokio::spawn(async move {
            let inner = ctx_b.clone();
            ctx_b
                .run_with_async(b, async move {
                    tokio::task::yield_now().await;
                    inner.get()
                })
                .await
        });

        assert_eq!(task_a.await.unwrap(), Some(a));
        assert_eq!(task_b.await.unwrap(), Some(b));
        assert_eq!(ctx.get(), Some(base));
    }

    #[tokio::test]
    async fn test_async_scope_restores_after_error() {
        let ctx = CorrelationContext::new();
        let inner_ctx = ctx.clone();
        let id = CorrelationId::generate();
        let result: Result<(), String> = ctx
            .run_with_async(id, async move {
                assert_eq!(inner_ctx.get(), Some(id));
                Err("failed".to_string())
            })
            .await;
        assert!(result.is_err());
        assert!(ctx.get().is_none());
    }

    #[test]
    fn test_manager_child_grouping() {
        let manager = CorrelationManager::default();
        let root = manager.start();
        let child = manager.create_child();
        assert_eq!(root.prefix(), child.prefix());
        assert_ne!(root, child);
    }
}
