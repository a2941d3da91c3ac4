use std::sync::atomic::{AtomicUsize, Ordering};

/// Resource kinds, one per pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCM,
    Target,
    Program,
}

impl ResourceKind {
    pub const COUNT: usize = 7;
}

/// Book-keeping shared by every resource: kind tag, reference count and
/// accounted byte usage.
///
/// The count starts at one for the creator. `release` reports `true` exactly
/// once, on the release that drops the count to zero; the frontend uses that
/// to schedule destruction.
#[derive(Debug)]
pub struct ResourceTracker {
    kind: ResourceKind,
    refcount: AtomicUsize,
    bytes: AtomicUsize,
}

impl ResourceTracker {
    pub fn new(kind: ResourceKind) -> ResourceTracker {
        ResourceTracker {
            kind,
            refcount: AtomicUsize::new(1),
            bytes: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn acquire(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) -> bool {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(previous != 0, "resource over-released");
        previous == 1
    }

    pub fn usage(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn set_usage(&self, bytes: usize) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_reports_zero_exactly_once() {
        let tracker = ResourceTracker::new(ResourceKind::Buffer);
        tracker.acquire();
        assert!(!tracker.release());
        assert!(tracker.release());
    }
}
