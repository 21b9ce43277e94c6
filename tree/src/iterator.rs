use std::sync::Arc;

use game::{GameResult, MoveToken};

use crate::edge::Edge;
use crate::node::{LowNode, Node};

/// An edge together with the node materialized for it, if any, plus proxy
/// accessors so callers need not branch on the node's presence.
pub struct EdgeAndNode<M: MoveToken> {
    low: Arc<LowNode<M>>,
    index: u16,
    node: Option<Arc<Node<M>>>,
}

impl<M: MoveToken> EdgeAndNode<M> {
    pub fn edge(&self) -> &Edge<M> {
        self.low.edge(usize::from(self.index))
    }

    pub fn node(&self) -> Option<&Arc<Node<M>>> {
        self.node.as_ref()
    }

    pub fn has_node(&self) -> bool {
        self.node.is_some()
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn get_move(&self, as_opponent: bool) -> M {
        self.edge().get_move(as_opponent)
    }

    pub fn p(&self) -> f32 {
        self.edge().p()
    }

    pub fn n(&self) -> u32 {
        self.node.as_ref().map_or(0, |n| n.n())
    }

    pub fn n_started(&self) -> u32 {
        self.node.as_ref().map_or(0, |n| n.n_started())
    }

    pub fn n_in_flight(&self) -> u32 {
        self.node.as_ref().map_or(0, |n| n.n_in_flight())
    }

    /// Node eval, or `default` while the node has no completed visits.
    pub fn wl(&self, default: f64) -> f64 {
        match &self.node {
            Some(node) if node.n() > 0 => node.wl(),
            _ => default,
        }
    }

    pub fn d(&self, default: f32) -> f32 {
        match &self.node {
            Some(node) if node.n() > 0 => node.d(),
            _ => default,
        }
    }

    pub fn m(&self, default: f32) -> f32 {
        match &self.node {
            Some(node) if node.n() > 0 => node.m(),
            _ => default,
        }
    }

    pub fn q(&self, default: f64, draw_score: f32) -> f64 {
        match &self.node {
            Some(node) if node.n() > 0 => node.q(draw_score),
            _ => default,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.node.as_ref().map_or(false, |n| n.is_terminal())
    }

    pub fn is_tb_terminal(&self) -> bool {
        self.node.as_ref().map_or(false, |n| n.is_tb_terminal())
    }

    pub fn bounds(&self) -> (GameResult, GameResult) {
        self.node
            .as_ref()
            .map_or((GameResult::BlackWon, GameResult::WhiteWon), |n| n.bounds())
    }

    /// Exploration numerator scaled by the prior and damped by started
    /// visits; `numerator` is expected to carry cpuct * sqrt(parent N).
    pub fn u(&self, numerator: f32) -> f32 {
        numerator * self.p() / (1 + self.n_started()) as f32
    }

    /// The node for this edge, spawning it into the parent's child list if
    /// no worker has done so yet.
    pub fn get_or_spawn_node(&self) -> Arc<Node<M>> {
        if let Some(node) = &self.node {
            return node.clone();
        }
        LowNode::get_or_spawn_child(&self.low, self.index)
    }
}

/// Cursor into the sibling list. Re-reading the link behind it on every
/// advance is what lets the walk observe nodes spawned concurrently at
/// indices it has not passed yet.
enum Cursor<M: MoveToken> {
    Head,
    After(Arc<Node<M>>),
}

/// Walks the edge array in order, pairing each edge with its materialized
/// node when one exists. The sibling list is sorted by edge index, so the
/// list walk advances in lockstep with the array walk.
pub struct EdgeIterator<M: MoveToken> {
    low: Option<Arc<LowNode<M>>>,
    cursor: Cursor<M>,
    current: u16,
    total: u16,
}

impl<M: MoveToken> EdgeIterator<M> {
    pub(crate) fn new(low: Option<Arc<LowNode<M>>>) -> Self {
        let total = low.as_ref().map_or(0, |l| u16::from(l.num_edges()));
        Self {
            low,
            cursor: Cursor::Head,
            current: 0,
            total,
        }
    }

    fn peek(&self) -> Option<Arc<Node<M>>> {
        match &self.cursor {
            Cursor::Head => self.low.as_ref().and_then(|low| low.child_head()),
            Cursor::After(node) => node.next_sibling(),
        }
    }

    /// Advances the list cursor until it lines up with the current edge
    /// index, picking up any nodes spawned behind it since the last look.
    fn actualize(&mut self) -> Option<Arc<Node<M>>> {
        loop {
            match self.peek() {
                Some(node) if node.index() < self.current => {
                    self.cursor = Cursor::After(node);
                }
                Some(node) if node.index() == self.current => {
                    self.cursor = Cursor::After(node.clone());
                    return Some(node);
                }
                _ => return None,
            }
        }
    }
}

impl<M: MoveToken> Iterator for EdgeIterator<M> {
    type Item = EdgeAndNode<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }
        let node = self.actualize();
        let item = EdgeAndNode {
            low: self.low.clone().expect("edges imply a low node"),
            index: self.current,
            node,
        };
        self.current += 1;
        Some(item)
    }
}

/// Yields materialized children with completed visits. Relies on selection
/// starting visits in sorted-prior order: the unvisited tail of the sibling
/// list begins at the first node with no visits started, so hitting one ends
/// the walk early instead of scanning the rest.
pub struct VisitedIterator<M: MoveToken> {
    cur: Option<Arc<Node<M>>>,
}

impl<M: MoveToken> VisitedIterator<M> {
    pub(crate) fn new(head: Option<Arc<Node<M>>>) -> Self {
        let mut iter = Self { cur: head };
        if iter.cur.as_ref().map_or(false, |n| n.n() == 0) {
            iter.advance();
        }
        iter
    }

    fn advance(&mut self) {
        loop {
            let next = match &self.cur {
                Some(node) => node.next_sibling(),
                None => return,
            };
            self.cur = next;
            match &self.cur {
                Some(node) if node.n() == 0 && node.n_in_flight() == 0 => {
                    self.cur = None;
                    return;
                }
                Some(node) if node.n() == 0 => continue,
                _ => return,
            }
        }
    }
}

impl<M: MoveToken> Iterator for VisitedIterator<M> {
    type Item = Arc<Node<M>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.cur.clone()?;
        self.advance();
        Some(item)
    }
}
