use std::sync::Arc;

use game::{MoveToken, Position, PositionHistory};
use log::debug;

use crate::gc::Reclaimer;
use crate::node::Node;

/// The game tree between searches: the game-begin node, the node searches
/// start from, and the move history that produced it. Re-rooting detaches
/// abandoned subtrees into the reclaimer instead of dropping them inline.
pub struct NodeTree<P: Position> {
    gamebegin_node: Option<Arc<Node<P::Move>>>,
    current_head: Option<Arc<Node<P::Move>>>,
    history: PositionHistory<P>,
    moves: Vec<P::Move>,
    gc: Arc<Reclaimer<P::Move>>,
}

impl<P: Position> NodeTree<P> {
    pub fn new(gc: Arc<Reclaimer<P::Move>>) -> Self {
        Self {
            gamebegin_node: None,
            current_head: None,
            history: PositionHistory::new(),
            moves: Vec::new(),
            gc,
        }
    }

    /// Advances the head along `mv`, keeping the chosen child's subtree and
    /// detaching everything else. Extends the tree when the move leads
    /// outside the known edges.
    pub fn make_move(&mut self, mv: P::Move) {
        let head_position = self.head_position().clone();
        let mv = if head_position.is_black_to_move() {
            mv.mirrored()
        } else {
            mv
        };
        let current = self
            .current_head
            .clone()
            .expect("reset_to_position must run before make_move");

        let mut new_head = None;
        for edge_and_node in current.edges() {
            if head_position.is_same_move(edge_and_node.get_move(false), mv) {
                let node = edge_and_node.get_or_spawn_node();
                // Keep the head searchable: tablebase hits, converted
                // terminals and repetition draws must not stop the search
                // from extending below them.
                if node.is_terminal() {
                    node.make_not_terminal(true);
                }
                new_head = Some(node);
                break;
            }
        }
        let mv = head_position.canonical_move(mv);

        current.release_children_except_one(new_head.as_ref(), &self.gc);
        let new_head = match current.child() {
            Some(node) => node,
            None => {
                // A move outside the known edges abandons the old expansion.
                current.unset_low_node();
                current.create_single_child_node(mv)
            }
        };
        self.current_head = Some(new_head);
        self.history.append(mv);
        self.moves.push(mv);
    }

    /// Scrubs stale search state off the head: children go to the
    /// reclaimer, the low node is released and the head's own stats reset,
    /// while its place in the tree stays intact.
    pub fn trim_tree_at_head(&mut self) {
        let Some(head) = self.current_head.clone() else {
            return;
        };
        head.release_children(&self.gc);
        head.unset_low_node();
        head.reset_search_stats();
    }

    /// Points the tree at the position reached by `moves` from `start`,
    /// reusing the existing tree when the new position continues the same
    /// game. Returns whether reuse succeeded; when the previous head was not
    /// passed during the replay its stale stats are trimmed.
    pub fn reset_to_position(&mut self, start: P, moves: &[P::Move]) -> bool {
        if self.gamebegin_node.is_some()
            && !self.history.is_empty()
            && !self.history.starting().same_start(&start)
        {
            debug!("starting position changed, deallocating tree");
            self.deallocate_tree();
        }

        if self.gamebegin_node.is_none() {
            self.gamebegin_node = Some(Arc::new(Node::new_root()));
        }

        self.history.reset(start);
        self.moves.clear();

        let old_head = self.current_head.take();
        self.current_head = self.gamebegin_node.clone();
        let mut seen_old_head = match (&old_head, &self.gamebegin_node) {
            (Some(old), Some(begin)) => Arc::ptr_eq(old, begin),
            _ => false,
        };

        for &mv in moves {
            self.make_move(mv);
            if let (Some(old), Some(current)) = (&old_head, &self.current_head) {
                if Arc::ptr_eq(old, current) {
                    seen_old_head = true;
                }
            }
        }

        // Replaying never leaves siblings behind, but a head that was an
        // ancestor of the previous one still carries stats from the old
        // search even though its children were trimmed away.
        if !seen_old_head {
            self.trim_tree_at_head();
        }
        debug!(
            "reset to ply {}, tree reuse: {}",
            self.ply_count(),
            seen_old_head
        );
        seen_old_head
    }

    /// Sends the whole tree to the reclaimer.
    pub fn deallocate_tree(&mut self) {
        self.gc.add_to_gc_queue(self.gamebegin_node.take());
        self.current_head = None;
    }

    pub fn head_position(&self) -> &P {
        self.history.last()
    }

    pub fn ply_count(&self) -> u32 {
        self.head_position().ply()
    }

    pub fn is_black_to_move(&self) -> bool {
        self.head_position().is_black_to_move()
    }

    pub fn current_head(&self) -> Option<&Arc<Node<P::Move>>> {
        self.current_head.as_ref()
    }

    pub fn gamebegin_node(&self) -> Option<&Arc<Node<P::Move>>> {
        self.gamebegin_node.as_ref()
    }

    pub fn position_history(&self) -> &PositionHistory<P> {
        &self.history
    }

    pub fn moves(&self) -> &[P::Move] {
        &self.moves
    }

    pub fn reclaimer(&self) -> &Arc<Reclaimer<P::Move>> {
        &self.gc
    }
}

impl<P: Position> Drop for NodeTree<P> {
    fn drop(&mut self) {
        self.deallocate_tree();
    }
}
