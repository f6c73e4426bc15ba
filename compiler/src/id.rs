// id.rs — Stable node identifiers for dataflow graphs
//
// Every node receives its id at construction time from the owning
// `Dataflow`'s allocator. Ids grow monotonically in construction order and
// are the only total order over nodes, so every set, map, and emission loop
// in the compiler iterates by NodeId.

use std::fmt;

use serde::Serialize;

/// Stable identifier for a dataflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for node ids. Produces monotonically increasing ids in
/// construction order, ensuring deterministic assignment.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_node: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next_node
    }
}
