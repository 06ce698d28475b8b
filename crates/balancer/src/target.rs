use edgeplay_compute::Node;

/// What the dispatcher needs to know about a node.
pub trait DispatchTarget: Send + Sync + 'static {
    /// Stable identifier used in statistics.
    fn id(&self) -> usize;

    /// Current weight for the weighted algorithm.
    fn weight(&self) -> u32;

    /// Recent fraction of blocked tasks, used by power-of-two-choices.
    fn block_rate(&self) -> f64;
}

impl DispatchTarget for Node {
    fn id(&self) -> usize {
        Node::id(self)
    }

    fn weight(&self) -> u32 {
        Node::weight(self)
    }

    fn block_rate(&self) -> f64 {
        Node::block_rate(self)
    }
}
