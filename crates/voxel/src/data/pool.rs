//! Memory pool for [`VoxelDataBase`] instances
//!
//! Decompressing a cube needs a full set of channel arrays; leasing them
//! from a pool avoids allocator churn on every rebuild. The pool tracks what
//! it has handed out and fails loudly on contract violations.

use std::sync::Mutex;

use crate::descriptor::VoxelRegionFlags;
use crate::error::VoxelError;

use super::base::VoxelDataBase;

#[derive(Debug)]
struct PoolInner {
    free: Vec<Box<VoxelDataBase>>,
    /// Stable addresses of every instance currently checked out.
    leased: Vec<*const VoxelDataBase>,
}

// Raw pointers are only compared, never dereferenced.
unsafe impl Send for PoolInner {}

/// Mutex-guarded free list of voxel data buckets.
#[derive(Debug)]
pub struct VoxelDataPool {
    inner: Mutex<PoolInner>,
    bucket_count: usize,
    flags: VoxelRegionFlags,
    grow_by: usize,
}

impl VoxelDataPool {
    /// `bucket_count` is the grid-point count of every instance; the pool is
    /// seeded with `initial` instances and grows by `grow_by` when drained.
    pub fn new(
        bucket_count: usize,
        flags: VoxelRegionFlags,
        initial: usize,
        grow_by: usize,
    ) -> Self {
        let free = (0..initial)
            .map(|_| Box::new(VoxelDataBase::new(bucket_count, flags)))
            .collect();
        Self {
            inner: Mutex::new(PoolInner {
                free,
                leased: Vec::new(),
            }),
            bucket_count,
            flags,
            grow_by: grow_by.max(1),
        }
    }

    /// Checks out an instance, growing the pool if none are free.
    pub fn lease(&self) -> Box<VoxelDataBase> {
        let mut inner = self.inner.lock().expect("voxel pool poisoned");
        if inner.free.is_empty() {
            tracing::debug!(grow_by = self.grow_by, "voxel pool drained, growing");
            for _ in 0..self.grow_by {
                inner
                    .free
                    .push(Box::new(VoxelDataBase::new(self.bucket_count, self.flags)));
            }
        }
        let bucket = inner.free.pop().expect("pool grew above");
        inner.leased.push(&*bucket as *const VoxelDataBase);
        bucket
    }

    /// Checks an instance back in.
    ///
    /// Retiring an object the pool never issued is a caller bug and returns
    /// [`VoxelError::UnmatchedLease`]; the object is dropped in that case.
    pub fn retire(&self, bucket: Box<VoxelDataBase>) -> Result<(), VoxelError> {
        let mut inner = self.inner.lock().expect("voxel pool poisoned");
        let address = &*bucket as *const VoxelDataBase;
        match inner.leased.iter().position(|&p| p == address) {
            Some(at) => {
                inner.leased.swap_remove(at);
                inner.free.push(bucket);
                Ok(())
            }
            None => Err(VoxelError::UnmatchedLease),
        }
    }

    /// Number of instances currently available.
    pub fn pooled(&self) -> usize {
        self.inner.lock().expect("voxel pool poisoned").free.len()
    }

    /// Number of instances currently checked out.
    pub fn leased(&self) -> usize {
        self.inner.lock().expect("voxel pool poisoned").leased.len()
    }
}

impl Drop for VoxelDataPool {
    /// Destroying the pool while leases are live would leave dangling
    /// registry entries; that is a lifecycle bug, not a recoverable state.
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            assert!(
                inner.leased.is_empty(),
                "voxel pool dropped with {} leased instance(s) outstanding",
                inner.leased.len()
            );
        }
    }
}
