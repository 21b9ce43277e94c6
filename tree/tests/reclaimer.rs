//! Behavior of the background reclamation worker: queued subtrees drain on
//! their own, the popped root's low node is released promptly, and shutdown
//! joins the worker.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use game::MoveToken;
use tree::{LowNode, NNEval, Node, Reclaimer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Mv(u16);

impl std::fmt::Display for Mv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

impl MoveToken for Mv {
    fn mirrored(self) -> Self {
        self
    }
}

fn expanded_root() -> Arc<Node<Mv>> {
    let root = Arc::new(Node::new_root());
    let eval = NNEval::new([(Mv(0), 0.7), (Mv(1), 0.3)], 0.0, 0.0, 0.0);
    let low = Arc::new(LowNode::from_eval(&eval));
    root.set_low_node(low.clone());
    LowNode::get_or_spawn_child(&low, 0);
    LowNode::get_or_spawn_child(&low, 1);
    root
}

#[test]
fn queued_subtrees_drain_without_help() {
    let gc: Reclaimer<Mv> = Reclaimer::new();

    for _ in 0..3 {
        gc.add_to_gc_queue(Some(expanded_root()));
    }
    assert!(gc.queued_subtrees() > 0);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(gc.queued_subtrees(), 0);
}

#[test]
fn empty_handles_are_a_no_op() {
    let gc: Reclaimer<Mv> = Reclaimer::new();
    gc.add_to_gc_queue(None);
    assert_eq!(gc.queued_subtrees(), 0);
}

#[test]
fn popped_roots_release_their_low_node_parent_slot() {
    let gc: Reclaimer<Mv> = Reclaimer::new();

    let eval = NNEval::new([(Mv(0), 1.0)], 0.0, 0.0, 0.0);
    let shared_low = Arc::new(LowNode::from_eval(&eval));

    // Two arrivals share one position record: a transposition.
    let keep = Arc::new(Node::new_root());
    keep.set_low_node(shared_low.clone());
    let doomed = Arc::new(Node::new_root());
    doomed.set_low_node(shared_low.clone());
    assert_eq!(shared_low.num_parents(), 2);
    assert!(shared_low.is_transposition());

    gc.add_to_gc_queue(Some(doomed.clone()));
    thread::sleep(Duration::from_millis(300));

    // The worker released the popped root's slot even though the test still
    // holds the node itself.
    assert!(doomed.low_node().is_none());
    assert_eq!(shared_low.num_parents(), 1);
    assert!(keep.low_node().is_some());
}

#[test]
fn shutdown_joins_the_worker_with_work_pending() {
    let gc: Reclaimer<Mv> = Reclaimer::new();
    for _ in 0..10 {
        gc.add_to_gc_queue(Some(expanded_root()));
    }
    // Dropping must stop the worker and never hang on the pending queue.
    drop(gc);
}
