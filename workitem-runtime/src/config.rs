use std::num::NonZeroUsize;

const DEFAULT_POOL_CAPACITY: NonZeroUsize = NonZeroUsize::new(32).unwrap();

/// Settings for one [`ActivityExecutor`](crate::ActivityExecutor).
///
/// # Example
///
/// ```rust,ignore
/// let config = ExecutorConfig::new("order-flow-1")
///     .with_pool_capacity(NonZeroUsize::new(8).unwrap())
///     .with_tracking_enabled(false);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    instance_id: String,
    pool_capacity: NonZeroUsize,
    tracking_enabled: bool,
}

impl ExecutorConfig {
    /// Configuration for the workflow instance `instance_id`, with a pool of
    /// 32 activity work items and tracking enabled.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            tracking_enabled: true,
        }
    }

    /// Set how many cleared activity work items are kept for reuse.
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Enable or disable tracking records.
    ///
    /// With tracking disabled no records are queued, so no work item ever
    /// waits on a tracking flush.
    #[must_use]
    pub fn with_tracking_enabled(mut self, enabled: bool) -> Self {
        self.tracking_enabled = enabled;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn pool_capacity(&self) -> NonZeroUsize {
        self.pool_capacity
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }
}
