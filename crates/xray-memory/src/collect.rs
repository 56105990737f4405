/// A request passed to a [`Collectable`] during a collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRequest {
    /// Bytes the component should shrink to (its share of the cycle's goal).
    pub target_bytes: u64,
    /// Ceiling configured on the runtime when the cycle started.
    pub ceiling_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionResult {
    pub before_bytes: u64,
    pub after_bytes: u64,
}

impl CollectionResult {
    pub fn freed_bytes(&self) -> u64 {
        self.before_bytes.saturating_sub(self.after_bytes)
    }
}

/// A host-owned cache that can release memory when the runtime collects.
///
/// Collection is cooperative: implementors drop their own references, the
/// runtime only decides how much each one should keep.
pub trait Collectable: Send + Sync {
    fn name(&self) -> &str;

    fn collect(&self, request: CollectionRequest) -> CollectionResult;
}
