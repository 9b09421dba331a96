//! Reuse pooling for work items on the hot execution path.
//!
//! Only variants implementing [`Reusable`] can be pooled. A pooled item is
//! handed out as [`Pooled<T>`], which carries its pool and implements
//! [`PooledWorkItem`]; the executor sees that capability through
//! [`ScheduledItem::Pooled`](crate::work_item::ScheduledItem::Pooled).

use crate::instance::ActivityInstance;
use crate::work_item::WorkItem;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Capability of work-item variants that can cycle through a pool.
///
/// Variants with their own per-use fields override both methods and call the
/// default behaviour on their [`WorkItemState`](crate::work_item::WorkItemState).
pub trait Reusable: WorkItem + Sized + 'static {
    /// Reset every per-use field so nothing leaks into the next use.
    fn clear_for_reuse(&mut self) {
        self.state_mut().clear_for_reuse();
    }

    /// Rebind to `instance`; symmetric with construction.
    fn reinitialize(&mut self, instance: Arc<ActivityInstance>) {
        self.state_mut().reinitialize(instance);
    }
}

/// A work item that knows how to go back to its pool.
pub trait PooledWorkItem: Send {
    fn work_item(&self) -> &dyn WorkItem;

    fn work_item_mut(&mut self) -> &mut dyn WorkItem;

    fn release_to_pool(self: Box<Self>);
}

/// A bounded free list of cleared work items of one variant.
pub struct WorkItemPool<T> {
    free: Mutex<Vec<Box<T>>>,
    capacity: NonZeroUsize,
}

impl<T: Reusable> WorkItemPool<T> {
    pub fn new(capacity: NonZeroUsize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(capacity.get())),
            capacity,
        })
    }

    /// Take a cleared item and reinitialize it for `instance`, or build a
    /// fresh one with `create` when the pool is empty.
    pub fn acquire<F>(self: &Arc<Self>, instance: Arc<ActivityInstance>, create: F) -> Pooled<T>
    where
        F: FnOnce(Arc<ActivityInstance>) -> T,
    {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let item = match recycled {
            Some(mut item) => {
                item.reinitialize(instance);
                item
            }
            None => Box::new(create(instance)),
        };

        Pooled {
            item,
            pool: Arc::clone(self),
        }
    }

    /// Number of cleared items waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    fn restore(&self, mut item: Box<T>) {
        item.clear_for_reuse();

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity.get() {
            free.push(item);
        }
    }
}

/// A work item on loan from a [`WorkItemPool`].
pub struct Pooled<T: Reusable> {
    item: Box<T>,
    pool: Arc<WorkItemPool<T>>,
}

impl<T: Reusable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Reusable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Reusable> PooledWorkItem for Pooled<T> {
    fn work_item(&self) -> &dyn WorkItem {
        self.item.as_ref()
    }

    fn work_item_mut(&mut self) -> &mut dyn WorkItem {
        self.item.as_mut()
    }

    /// # Panics
    ///
    /// Panics if the item still holds a busy count on its instance.
    fn release_to_pool(self: Box<Self>) {
        assert!(
            self.item.state().is_released(),
            "pooled work item returned before it was released"
        );
        let Pooled { item, pool } = *self;
        pool.restore(item);
    }
}
