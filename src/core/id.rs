/// ID-based handles for buffers and background workers.
/// Workers remember the id of the buffer they serve, never a reference to it,
/// so a buffer closed mid-flight simply stops resolving.
use std::fmt;

/// Stable identifier for a buffer. Ids are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({})", self.0)
    }
}

/// Identity of one background load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_id() {
        let id1 = BufferId(0);
        let id2 = BufferId(1);
        assert_ne!(id1, id2);
        assert_eq!(format!("{}", id1), "Buffer(0)");
    }

    #[test]
    fn test_worker_id() {
        assert_eq!(format!("{}", WorkerId(7)), "Worker(7)");
        assert!(WorkerId(1) < WorkerId(2));
    }
}
