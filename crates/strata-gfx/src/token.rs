//! Move-only lifetime tokens for factory-created resources
//!
//! Deletion of a token triggers mass-deallocation of its group or pool.
//! Please don't delete and draw contained resources in the same frame; the
//! backend is free to reclaim memory immediately.

use std::sync::Arc;

use crate::error::{GfxError, GfxResult};
use crate::factory::{BufferHandle, DataId, FactoryOps, PoolId};
use crate::types::BufferUse;

/// Ownership token for one committed transaction's resources
///
/// Move-only; dropping it destroys every resource of the group exactly
/// once. An explicitly destroyed token tolerates being dropped afterwards.
pub struct GraphicsDataToken {
    inner: Option<(Arc<dyn FactoryOps>, DataId)>,
}

impl GraphicsDataToken {
    /// Mint a token for a committed group; called by backends only
    pub fn new(ops: Arc<dyn FactoryOps>, data: DataId) -> Self {
        Self {
            inner: Some((ops, data)),
        }
    }

    /// Whether this token still owns a live group
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// The owned group id, if any
    pub fn data_id(&self) -> Option<DataId> {
        self.inner.as_ref().map(|(_, id)| *id)
    }

    /// Destroy the owned group now instead of at drop time; idempotent
    pub fn destroy(&mut self) {
        if let Some((ops, data)) = self.inner.take() {
            ops.destroy_data(data);
        }
    }
}

impl Drop for GraphicsDataToken {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Ownership token for an appendable list of pool buffers
///
/// Buffers are created and deleted individually while the pool is alive;
/// dropping the token destroys the pool and every buffer remaining in it.
pub struct BufferPoolToken {
    inner: Option<(Arc<dyn FactoryOps>, PoolId)>,
}

impl BufferPoolToken {
    /// Mint a token for a new pool; called by backends only
    pub fn new(ops: Arc<dyn FactoryOps>, pool: PoolId) -> Self {
        Self {
            inner: Some((ops, pool)),
        }
    }

    /// Whether this token still owns a live pool
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Create a dynamic buffer owned by this pool
    pub fn new_pool_buffer(
        &self,
        use_: BufferUse,
        stride: usize,
        count: usize,
    ) -> GfxResult<BufferHandle> {
        let (ops, pool) = self.inner.as_ref().ok_or(GfxError::EmptyToken)?;
        ops.new_pool_buffer(*pool, use_, stride, count)
    }

    /// Destroy one buffer ahead of the pool itself
    pub fn delete_pool_buffer(&self, buf: BufferHandle) {
        if let Some((ops, pool)) = self.inner.as_ref() {
            ops.delete_pool_buffer(*pool, buf);
        }
    }

    /// Destroy the pool now instead of at drop time; idempotent
    pub fn destroy(&mut self) {
        if let Some((ops, pool)) = self.inner.take() {
            ops.destroy_pool(pool);
        }
    }
}

impl Drop for BufferPoolToken {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOps {
        data_destroys: AtomicUsize,
        pool_destroys: AtomicUsize,
    }

    impl FactoryOps for CountingOps {
        fn destroy_data(&self, _data: DataId) {
            self.data_destroys.fetch_add(1, Ordering::SeqCst);
        }

        fn destroy_pool(&self, _pool: PoolId) {
            self.pool_destroys.fetch_add(1, Ordering::SeqCst);
        }

        fn new_pool_buffer(
            &self,
            _pool: PoolId,
            _use: BufferUse,
            _stride: usize,
            _count: usize,
        ) -> GfxResult<BufferHandle> {
            Err(GfxError::EmptyToken)
        }

        fn delete_pool_buffer(&self, _pool: PoolId, _buf: BufferHandle) {}

        fn unmap(&self, _resource: crate::factory::ResourceId, _data: &[u8]) {}
    }

    fn counting_ops() -> Arc<CountingOps> {
        Arc::new(CountingOps {
            data_destroys: AtomicUsize::new(0),
            pool_destroys: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_token_destroys_once_on_drop() {
        let ops = counting_ops();
        {
            let _token = GraphicsDataToken::new(ops.clone(), DataId(1));
        }
        assert_eq!(ops.data_destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_destroy_is_idempotent() {
        let ops = counting_ops();
        let mut token = GraphicsDataToken::new(ops.clone(), DataId(1));
        token.destroy();
        token.destroy();
        drop(token);
        assert_eq!(ops.data_destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_moved_token_destroys_once() {
        let ops = counting_ops();
        let token = GraphicsDataToken::new(ops.clone(), DataId(7));
        let moved = token;
        assert!(moved.is_valid());
        drop(moved);
        assert_eq!(ops.data_destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_token_destroy_on_drop() {
        let ops = counting_ops();
        {
            let _pool = BufferPoolToken::new(ops.clone(), PoolId(3));
        }
        assert_eq!(ops.pool_destroys.load(Ordering::SeqCst), 1);
    }
}
