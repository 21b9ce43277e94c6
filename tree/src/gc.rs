use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use game::MoveToken;
use log::debug;
use parking_lot::Mutex;

use crate::node::Node;

/// Periodicity of the background reclamation worker.
const GC_INTERVAL: Duration = Duration::from_millis(100);

/// Owns detached subtrees and destroys them off the search thread. Handing a
/// subtree over is a pointer move; the deep destructor walk runs on the
/// worker, so re-rooting a large tree never stalls the mover.
pub struct Reclaimer<M: MoveToken> {
    shared: Arc<Shared<M>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared<M: MoveToken> {
    subtrees: Mutex<Vec<Arc<Node<M>>>>,
    stop: AtomicBool,
}

impl<M: MoveToken> Reclaimer<M> {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            subtrees: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("tree-gc".into())
            .spawn(move || worker_shared.run())
            .expect("failed to spawn reclaimer worker");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Takes ownership of a detached subtree. An empty handle is a no-op.
    pub fn add_to_gc_queue(&self, subtree: Option<Arc<Node<M>>>) {
        let Some(subtree) = subtree else { return };
        self.shared.subtrees.lock().push(subtree);
    }

    /// Subtrees accepted but not yet destroyed. Observational.
    pub fn queued_subtrees(&self) -> usize {
        self.shared.subtrees.lock().len()
    }
}

impl<M: MoveToken> Default for Reclaimer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MoveToken> Shared<M> {
    fn run(&self) {
        debug!("subtree reclaimer started");
        while !self.stop.load(Ordering::Acquire) {
            thread::sleep(GC_INTERVAL);
            self.collect();
        }
        debug!("subtree reclaimer stopped");
    }

    fn collect(&self) {
        while !self.stop.load(Ordering::Acquire) {
            // Pop one entry under the lock; the deep drop runs outside it.
            let subtree = self.subtrees.lock().pop();
            let Some(subtree) = subtree else { return };
            // Give the low node its parent slot back before the subtree
            // destructor gets around to the rest.
            subtree.unset_low_node();
            drop(subtree);
        }
    }
}

impl<M: MoveToken> Drop for Reclaimer<M> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.join().expect("reclaimer worker panicked");
        }
    }
}
