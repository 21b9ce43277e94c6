use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use game::{GameResult, MoveToken};
use log::warn;
use parking_lot::Mutex;

use crate::edge::Edge;
use crate::eval::NNEval;
use crate::gc::Reclaimer;
use crate::iterator::{EdgeIterator, VisitedIterator};

/// Why a node counts as decided. `TwoFold` is path-dependent (a repetition
/// draw depends on the moves that led here), so it appears on nodes only,
/// never on the shared per-position record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TerminalType {
    NonTerminal = 0,
    EndOfGame = 1,
    Tablebase = 2,
    TwoFold = 3,
}

const TERMINAL_MASK: u8 = 0b11;
const LOWER_SHIFT: u32 = 2;
const UPPER_SHIFT: u32 = 4;
const BOUND_MASK: u8 = 0b11;
const TRANSPOSITION_BIT: u8 = 1 << 6;

fn result_code(result: GameResult) -> u8 {
    match result {
        GameResult::BlackWon => 0,
        GameResult::Draw => 1,
        GameResult::WhiteWon => 2,
    }
}

fn result_from_code(code: u8) -> GameResult {
    match code & BOUND_MASK {
        0 => GameResult::BlackWon,
        1 => GameResult::Draw,
        _ => GameResult::WhiteWon,
    }
}

/// Terminal type and both bounds packed into one byte so status reads never
/// touch the stats lock. Bit 6 is the sticky transposition flag.
struct StatusByte(AtomicU8);

impl StatusByte {
    const INITIAL: u8 = (2 << UPPER_SHIFT) | (0 << LOWER_SHIFT) | TerminalType::NonTerminal as u8;

    fn new() -> Self {
        Self(AtomicU8::new(Self::INITIAL))
    }

    fn update(&self, f: impl Fn(u8) -> u8) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            match self
                .0
                .compare_exchange_weak(cur, f(cur), Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(seen) => cur = seen,
            }
        }
    }

    fn terminal_type(&self) -> TerminalType {
        match self.0.load(Ordering::Relaxed) & TERMINAL_MASK {
            0 => TerminalType::NonTerminal,
            1 => TerminalType::EndOfGame,
            2 => TerminalType::Tablebase,
            _ => TerminalType::TwoFold,
        }
    }

    fn set_terminal_type(&self, terminal_type: TerminalType) {
        self.update(|b| (b & !TERMINAL_MASK) | terminal_type as u8);
    }

    fn bounds(&self) -> (GameResult, GameResult) {
        let b = self.0.load(Ordering::Relaxed);
        (
            result_from_code(b >> LOWER_SHIFT),
            result_from_code(b >> UPPER_SHIFT),
        )
    }

    fn set_bounds(&self, lower: GameResult, upper: GameResult) {
        debug_assert!(lower <= upper, "crossed bounds");
        let packed = (result_code(lower) << LOWER_SHIFT) | (result_code(upper) << UPPER_SHIFT);
        self.update(|b| (b & !((BOUND_MASK << LOWER_SHIFT) | (BOUND_MASK << UPPER_SHIFT))) | packed);
    }

    fn is_transposition(&self) -> bool {
        self.0.load(Ordering::Relaxed) & TRANSPOSITION_BIT != 0
    }

    fn mark_transposition(&self) {
        self.0.fetch_or(TRANSPOSITION_BIT, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.0.store(Self::INITIAL, Ordering::Relaxed);
    }
}

/// Visit-weighted running means plus the visit counters, for both node
/// tiers. Lives behind a per-node mutex so a multivisit update is observed
/// as a single transition of `n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueStats {
    /// Mean of (wins - losses) over the subtree, from the perspective of the
    /// player who just moved into this position.
    pub wl: f64,
    /// Mean draw probability; not perspective-flipped.
    pub d: f32,
    /// Mean estimated remaining plies.
    pub m: f32,
    /// Completed visits.
    pub n: u32,
    /// Visits started but not yet finalized (virtual loss).
    pub n_in_flight: u32,
}

impl ValueStats {
    fn finalize(&mut self, v: f32, d: f32, m: f32, multivisit: u32) {
        self.wl += f64::from(multivisit) * (f64::from(v) - self.wl)
            / f64::from(self.n + multivisit);
        self.d += multivisit as f32 * (d - self.d) / (self.n + multivisit) as f32;
        self.m += multivisit as f32 * (m - self.m) / (self.n + multivisit) as f32;
        self.n += multivisit;
    }

    fn adjust(&mut self, v: f32, d: f32, m: f32, multivisit: u32) {
        debug_assert!(self.n > 0, "terminal adjustment without completed visits");
        self.wl += f64::from(multivisit) * f64::from(v) / f64::from(self.n);
        self.d += multivisit as f32 * d / self.n as f32;
        self.m += multivisit as f32 * m / self.n as f32;
    }

    fn set_result(&mut self, result: GameResult, plies_left: f32) {
        self.m = plies_left;
        match result {
            GameResult::Draw => {
                self.wl = 0.0;
                self.d = 1.0;
            }
            GameResult::WhiteWon => {
                self.wl = 1.0;
                self.d = 0.0;
            }
            GameResult::BlackWon => {
                self.wl = -1.0;
                self.d = 0.0;
            }
        }
    }
}

/// Per-position record, shared across transpositions. Holds the edge array,
/// the head of the materialized-children list and the aggregate stats of
/// every path that reached this position.
pub struct LowNode<M: MoveToken> {
    stats: Mutex<ValueStats>,
    edges: Box<[Edge<M>]>,
    child: Mutex<Option<Arc<Node<M>>>>,
    status: StatusByte,
    num_parents: AtomicU8,
}

impl<M: MoveToken> LowNode<M> {
    /// A low node carrying the edges and eval of a finished network
    /// evaluation. The eval stays shareable; edges are copied out of it.
    pub fn from_eval(eval: &NNEval<M>) -> Self {
        Self {
            stats: Mutex::new(ValueStats {
                wl: f64::from(eval.q),
                d: eval.d,
                m: eval.m,
                n: 0,
                n_in_flight: 0,
            }),
            edges: eval.edges.to_vec().into_boxed_slice(),
            child: Mutex::new(None),
            status: StatusByte::new(),
            num_parents: AtomicU8::new(0),
        }
    }

    /// A low node over a bare move list, with zeroed priors and eval.
    pub fn from_moves(moves: &[M]) -> Self {
        assert!(moves.len() <= usize::from(u8::MAX), "too many edges");
        Self {
            stats: Mutex::new(ValueStats::default()),
            edges: Edge::from_moves(moves),
            child: Mutex::new(None),
            status: StatusByte::new(),
            num_parents: AtomicU8::new(0),
        }
    }

    /// A low node reusing another's eval and edges only; visits, terminal
    /// status and parent accounting start fresh.
    pub fn from_eval_of(other: &LowNode<M>) -> Self {
        assert!(!other.edges.is_empty(), "source low node was never evaluated");
        let src = other.value_stats();
        Self {
            stats: Mutex::new(ValueStats {
                wl: src.wl,
                d: src.d,
                m: src.m,
                n: 0,
                n_in_flight: 0,
            }),
            edges: other.edges.to_vec().into_boxed_slice(),
            child: Mutex::new(None),
            status: StatusByte::new(),
            num_parents: AtomicU8::new(0),
        }
    }

    /// A low node over `moves` with the child at `index` already spawned.
    pub fn new_with_child(moves: &[M], index: u16) -> Arc<Self> {
        let low = Arc::new(Self::from_moves(moves));
        Self::get_or_spawn_child(&low, index);
        low
    }

    pub fn edges(&self) -> &[Edge<M>] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> &Edge<M> {
        &self.edges[index]
    }

    pub fn num_edges(&self) -> u8 {
        self.edges.len() as u8
    }

    pub fn has_children(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Decoded priors of the first `out.len()` edges.
    pub fn copy_policy(&self, out: &mut [f32]) {
        for (slot, edge) in out.iter_mut().zip(self.edges.iter()) {
            *slot = edge.p();
        }
    }

    /// One-time descending sort of the edge array. Edges are frozen once a
    /// child has been materialized, so this must run before any spawn.
    pub fn sort_edges(&mut self) {
        assert!(!self.edges.is_empty(), "no edges to sort");
        assert!(
            self.child.get_mut().is_none(),
            "edges are frozen once children are materialized"
        );
        Edge::sort_edges(&mut self.edges);
    }

    pub fn child_head(&self) -> Option<Arc<Node<M>>> {
        self.child.lock().clone()
    }

    /// Returns the child node at `index`, spawning and splicing it into the
    /// sorted sibling list if it does not exist yet. Spawns on one parent
    /// must be serialized by the caller; the walk re-reads each link so it
    /// re-discovers nodes spawned by iterators it did not see.
    pub fn get_or_spawn_child(low: &Arc<Self>, index: u16) -> Arc<Node<M>> {
        assert!(
            usize::from(index) < low.edges.len(),
            "edge index out of range"
        );

        let mut prev: Option<Arc<Node<M>>> = None;
        loop {
            let mut slot = match prev.as_ref() {
                None => low.child.lock(),
                Some(node) => node.sibling.lock(),
            };
            match (*slot).clone() {
                Some(next) if next.index < index => {
                    drop(slot);
                    prev = Some(next);
                }
                Some(next) if next.index == index => return next,
                tail => {
                    let spawned = Arc::new(Node {
                        low_node: ArcSwapOption::empty(),
                        parent: Arc::downgrade(low),
                        sibling: Mutex::new(tail),
                        stats: Mutex::new(ValueStats::default()),
                        status: StatusByte::new(),
                        index,
                    });
                    *slot = Some(spawned.clone());
                    return spawned;
                }
            }
        }
    }

    /// Hands every child subtree to the reclaimer.
    pub fn release_children(&self, gc: &Reclaimer<M>) {
        gc.add_to_gc_queue(self.child.lock().take());
    }

    /// Hands every child subtree except `keep` to the reclaimer. With no
    /// `keep` (or one that is not in the list) the child list empties out.
    pub fn release_children_except_one(&self, keep: Option<&Arc<Node<M>>>, gc: &Reclaimer<M>) {
        let head = self.child.lock().take();
        let Some(keep) = keep else {
            gc.add_to_gc_queue(head);
            return;
        };

        let mut prev: Option<Arc<Node<M>>> = None;
        let mut cur = head.clone();
        let mut found = false;
        while let Some(node) = cur {
            if Arc::ptr_eq(&node, keep) {
                gc.add_to_gc_queue(node.sibling.lock().take());
                if let Some(p) = prev.as_ref() {
                    p.sibling.lock().take();
                }
                found = true;
                break;
            }
            cur = node.sibling.lock().clone();
            prev = Some(node);
        }

        if !found {
            gc.add_to_gc_queue(head);
            return;
        }
        if prev.is_some() {
            // The prefix chain no longer reaches the kept node.
            gc.add_to_gc_queue(head);
        }
        *self.child.lock() = Some(keep.clone());
    }

    pub fn n(&self) -> u32 {
        self.stats.lock().n
    }

    pub fn n_in_flight(&self) -> u32 {
        self.stats.lock().n_in_flight
    }

    pub fn n_started(&self) -> u32 {
        let stats = self.stats.lock();
        stats.n + stats.n_in_flight
    }

    /// Visits that flowed on to children: everything except the first visit,
    /// which paid for the evaluation of this position itself.
    pub fn children_visits(&self) -> u32 {
        self.stats.lock().n.saturating_sub(1)
    }

    pub fn wl(&self) -> f64 {
        self.stats.lock().wl
    }

    pub fn d(&self) -> f32 {
        self.stats.lock().d
    }

    pub fn m(&self) -> f32 {
        self.stats.lock().m
    }

    pub fn value_stats(&self) -> ValueStats {
        *self.stats.lock()
    }

    pub fn finalize_score_update(&self, v: f32, d: f32, m: f32, multivisit: u32) {
        self.stats.lock().finalize(v, d, m, multivisit);
    }

    pub fn adjust_for_terminal(&self, v: f32, d: f32, m: f32, multivisit: u32) {
        self.stats.lock().adjust(v, d, m, multivisit);
    }

    pub fn cancel_score_update(&self, multivisit: u32) {
        let mut stats = self.stats.lock();
        assert!(stats.n_in_flight >= multivisit, "n_in_flight underflow");
        stats.n_in_flight -= multivisit;
    }

    pub fn increment_n_in_flight(&self, multivisit: u32) {
        self.stats.lock().n_in_flight += multivisit;
    }

    pub fn terminal_type(&self) -> TerminalType {
        self.status.terminal_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.terminal_type() != TerminalType::NonTerminal
    }

    pub fn bounds(&self) -> (GameResult, GameResult) {
        self.status.bounds()
    }

    pub fn set_bounds(&self, lower: GameResult, upper: GameResult) {
        self.status.set_bounds(lower, upper);
    }

    /// Marks the position decided and overwrites its eval with the result.
    /// Two-fold draws keep their bounds open: the repetition depends on the
    /// path, not the position.
    pub fn make_terminal(&self, result: GameResult, plies_left: f32, terminal_type: TerminalType) {
        if terminal_type != TerminalType::TwoFold {
            self.set_bounds(result, result);
        }
        self.status.set_terminal_type(terminal_type);
        self.stats.lock().set_result(result, plies_left);
    }

    /// Clears terminal status and rebuilds visits and values from the
    /// visited children of the incoming node. With no visited children the
    /// stats stay zeroed.
    pub fn make_not_terminal(&self, node: &Node<M>) {
        assert!(!self.edges.is_empty(), "clearing terminal status requires edges");
        if !self.is_terminal() {
            return;
        }

        self.status.set_terminal_type(TerminalType::NonTerminal);
        self.set_bounds(GameResult::BlackWon, GameResult::WhiteWon);

        let mut n: u32 = 0;
        let mut wl: f64 = 0.0;
        let mut d: f32 = 0.0;
        let mut m: f32 = 0.0;
        for child in node.edges() {
            let child_n = child.n();
            if child_n > 0 {
                n += child_n;
                wl += child.wl(0.0) * f64::from(child_n);
                d += child.d(0.0) * child_n as f32;
                m += child.m(0.0) * child_n as f32;
            }
        }

        let mut stats = self.stats.lock();
        if n > 0 {
            stats.wl = wl / f64::from(n);
            stats.d = d / n as f32;
            stats.m = m / n as f32;
        } else {
            stats.wl = 0.0;
            stats.d = 0.0;
            stats.m = 0.0;
        }
        stats.n = n;
    }

    /// Registers a new parent arriving with `n_in_flight` visits already
    /// descending through it. A second parent makes this a transposition,
    /// permanently.
    pub fn add_parent(&self, n_in_flight: u32) {
        let prev = self.num_parents.fetch_add(1, Ordering::AcqRel);
        if prev >= 1 {
            self.status.mark_transposition();
        }
        self.increment_n_in_flight(n_in_flight);
    }

    pub fn remove_parent(&self) {
        let prev = self.num_parents.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "removed a parent that was never added");
    }

    pub fn num_parents(&self) -> u8 {
        self.num_parents.load(Ordering::Acquire)
    }

    pub fn is_transposition(&self) -> bool {
        self.status.is_transposition()
    }
}

impl<M: MoveToken> fmt::Debug for LowNode<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.value_stats();
        let (lower, upper) = self.bounds();
        write!(
            f,
            "<LowNode> edges:{} wl:{} d:{} m:{} n:{} n_in_flight:{} parents:{} term:{:?} bounds:({},{})",
            self.edges.len(),
            stats.wl,
            stats.d,
            stats.m,
            stats.n,
            stats.n_in_flight,
            self.num_parents(),
            self.terminal_type(),
            lower.as_i8(),
            upper.as_i8(),
        )
    }
}

/// Per-arrival record: one occurrence of a position in the tree, reached
/// through the parent's edge at `index`. Carries its own visit stats and
/// terminal status, which may diverge from the shared low node's (a two-fold
/// draw is real for this path only).
pub struct Node<M: MoveToken> {
    low_node: ArcSwapOption<LowNode<M>>,
    parent: Weak<LowNode<M>>,
    sibling: Mutex<Option<Arc<Node<M>>>>,
    stats: Mutex<ValueStats>,
    status: StatusByte,
    index: u16,
}

impl<M: MoveToken> Node<M> {
    /// The game-begin node: no parent edge, index 0.
    pub fn new_root() -> Self {
        Self {
            low_node: ArcSwapOption::empty(),
            parent: Weak::new(),
            sibling: Mutex::new(None),
            stats: Mutex::new(ValueStats::default()),
            status: StatusByte::new(),
            index: 0,
        }
    }

    /// Index of this node's edge in the parent's edge array.
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn parent(&self) -> Option<Arc<LowNode<M>>> {
        self.parent.upgrade()
    }

    pub fn low_node(&self) -> Option<Arc<LowNode<M>>> {
        self.low_node.load_full()
    }

    /// Attaches the evaluated position record, registering this node as a
    /// parent along with its in-flight visits.
    pub fn set_low_node(&self, low_node: Arc<LowNode<M>>) {
        low_node.add_parent(self.n_in_flight());
        let prev = self.low_node.swap(Some(low_node));
        assert!(prev.is_none(), "low node is already set");
    }

    /// Detaches the position record and gives back this node's parent slot.
    pub fn unset_low_node(&self) {
        if let Some(low_node) = self.low_node.swap(None) {
            low_node.remove_parent();
        }
    }

    /// Extends the tree below a node that has no edges yet with a single
    /// known move, spawning the node for it.
    pub fn create_single_child_node(&self, mv: M) -> Arc<Node<M>> {
        assert!(self.low_node().is_none(), "node already has a low node");
        let low_node = LowNode::new_with_child(&[mv], 0);
        let child = low_node.child_head().expect("child was just spawned");
        self.set_low_node(low_node);
        child
    }

    pub fn has_children(&self) -> bool {
        self.low_node().map_or(false, |low| low.has_children())
    }

    pub fn num_edges(&self) -> u8 {
        self.low_node().map_or(0, |low| low.num_edges())
    }

    pub fn copy_policy(&self, out: &mut [f32]) {
        let low = self.low_node().expect("node was never evaluated");
        low.copy_policy(out);
    }

    /// First materialized child, if any.
    pub fn child(&self) -> Option<Arc<Node<M>>> {
        self.low_node().and_then(|low| low.child_head())
    }

    pub fn next_sibling(&self) -> Option<Arc<Node<M>>> {
        self.sibling.lock().clone()
    }

    /// Iterates `(edge, node)` pairs over the parent low node's edge array.
    pub fn edges(&self) -> EdgeIterator<M> {
        EdgeIterator::new(self.low_node())
    }

    /// Iterates materialized children with completed visits.
    pub fn visited_nodes(&self) -> VisitedIterator<M> {
        VisitedIterator::new(self.child())
    }

    pub fn n(&self) -> u32 {
        self.stats.lock().n
    }

    pub fn n_in_flight(&self) -> u32 {
        self.stats.lock().n_in_flight
    }

    pub fn n_started(&self) -> u32 {
        let stats = self.stats.lock();
        stats.n + stats.n_in_flight
    }

    pub fn children_visits(&self) -> u32 {
        self.low_node().map_or(0, |low| low.children_visits())
    }

    pub fn total_visits(&self) -> u32 {
        self.low_node().map_or(0, |low| low.n())
    }

    pub fn wl(&self) -> f64 {
        self.stats.lock().wl
    }

    pub fn d(&self) -> f32 {
        self.stats.lock().d
    }

    pub fn m(&self) -> f32 {
        self.stats.lock().m
    }

    /// Eval with the draw score folded in.
    pub fn q(&self, draw_score: f32) -> f64 {
        let stats = self.stats.lock();
        stats.wl + f64::from(draw_score * stats.d)
    }

    pub fn value_stats(&self) -> ValueStats {
        *self.stats.lock()
    }

    /// Sum of priors of children that have completed at least one visit.
    pub fn visited_policy(&self) -> f32 {
        let Some(low) = self.low_node() else {
            return 0.0;
        };
        self.visited_nodes()
            .map(|child| low.edge(usize::from(child.index())).p())
            .sum()
    }

    /// Gate for first expansion: a node with no completed visits that
    /// already has a visit in flight is being expanded by another worker, so
    /// the caller must pick a different node. On success the caller owns one
    /// in-flight visit.
    pub fn try_start_score_update(&self) -> bool {
        let mut stats = self.stats.lock();
        if stats.n == 0 && stats.n_in_flight > 0 {
            return false;
        }
        stats.n_in_flight += 1;
        true
    }

    pub fn cancel_score_update(&self, multivisit: u32) {
        let mut stats = self.stats.lock();
        assert!(stats.n_in_flight >= multivisit, "n_in_flight underflow");
        stats.n_in_flight -= multivisit;
    }

    pub fn finalize_score_update(&self, v: f32, d: f32, m: f32, multivisit: u32) {
        let mut stats = self.stats.lock();
        assert!(stats.n_in_flight >= multivisit, "n_in_flight underflow");
        stats.finalize(v, d, m, multivisit);
        stats.n_in_flight -= multivisit;
    }

    pub fn adjust_for_terminal(&self, v: f32, d: f32, m: f32, multivisit: u32) {
        self.stats.lock().adjust(v, d, m, multivisit);
    }

    /// Takes `multivisit` completed visits of a formerly-terminal result
    /// back out of the running means. Draining the last visit resets to the
    /// canonical zero-visit state instead of going negative.
    pub fn revert_terminal_visits(&self, v: f32, d: f32, m: f32, multivisit: u32) {
        let mut stats = self.stats.lock();
        let n_new = i64::from(stats.n) - i64::from(multivisit);
        if n_new <= 0 {
            stats.wl = 0.0;
            stats.d = 1.0;
            stats.m = 0.0;
            stats.n = 0;
        } else {
            stats.wl -=
                f64::from(multivisit) * (f64::from(v) - stats.wl) / n_new as f64;
            stats.d -= multivisit as f32 * (d - stats.d) / n_new as f32;
            stats.m -= multivisit as f32 * (m - stats.m) / n_new as f32;
            stats.n -= multivisit;
        }
    }

    /// Amplifies the in-flight count on this node and its low node, used
    /// when one selection is accounted as several visits.
    pub fn increment_n_in_flight(&self, multivisit: u32) {
        if let Some(low) = self.low_node() {
            low.increment_n_in_flight(multivisit);
        }
        self.stats.lock().n_in_flight += multivisit;
    }

    pub fn terminal_type(&self) -> TerminalType {
        self.status.terminal_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.terminal_type() != TerminalType::NonTerminal
    }

    pub fn is_tb_terminal(&self) -> bool {
        self.status.terminal_type() == TerminalType::Tablebase
    }

    pub fn is_two_fold_terminal(&self) -> bool {
        self.status.terminal_type() == TerminalType::TwoFold
    }

    pub fn bounds(&self) -> (GameResult, GameResult) {
        self.status.bounds()
    }

    pub fn set_bounds(&self, lower: GameResult, upper: GameResult) {
        self.status.set_bounds(lower, upper);
    }

    /// Marks this arrival decided. A proven loss additionally clears the
    /// prior on the edge leading here, unless this is the tree root.
    pub fn make_terminal(&self, result: GameResult, plies_left: f32, terminal_type: TerminalType) {
        if terminal_type != TerminalType::TwoFold {
            self.set_bounds(result, result);
        }
        self.status.set_terminal_type(terminal_type);
        self.stats.lock().set_result(result, plies_left);

        if result == GameResult::BlackWon {
            if let Some(parent) = self.parent.upgrade() {
                parent.edge(usize::from(self.index)).set_p(0.0);
            }
        }
    }

    /// Clears terminal status, restoring stats from the low node (with the
    /// perspective flip and one extra ply) or to zero when there is none.
    /// Reverts the low node first unless `also_low_node` is false. Calling
    /// on an already non-terminal pair is a no-op.
    pub fn make_not_terminal(&self, also_low_node: bool) {
        let low = self.low_node();
        let low_is_terminal =
            also_low_node && low.as_ref().map_or(false, |l| l.is_terminal());
        if !self.is_terminal() && !low_is_terminal {
            return;
        }

        self.status.set_terminal_type(TerminalType::NonTerminal);
        match low {
            Some(low) => {
                if also_low_node {
                    low.make_not_terminal(self);
                }
                let (lower, upper) = low.bounds();
                self.set_bounds(-upper, -lower);

                let low_stats = low.value_stats();
                let mut stats = self.stats.lock();
                stats.n = low_stats.n;
                stats.wl = -low_stats.wl;
                stats.d = low_stats.d;
                stats.m = low_stats.m + 1.0;
            }
            None => {
                self.set_bounds(GameResult::BlackWon, GameResult::WhiteWon);
                let mut stats = self.stats.lock();
                stats.n = 0;
                stats.wl = 0.0;
                stats.d = 0.0;
                stats.m = 0.0;
            }
        }
    }

    /// Hands all child subtrees to the reclaimer. Safe on a node whose low
    /// node was never attached or was already reverted away.
    pub fn release_children(&self, gc: &Reclaimer<M>) {
        if let Some(low) = self.low_node() {
            low.release_children(gc);
        }
    }

    /// Hands all child subtrees except `keep` to the reclaimer.
    pub fn release_children_except_one(&self, keep: Option<&Arc<Node<M>>>, gc: &Reclaimer<M>) {
        if let Some(low) = self.low_node() {
            low.release_children_except_one(keep, gc);
        }
    }

    /// Zeroes this node's own stats and terminal status while keeping its
    /// parent/index linkage and siblings in place.
    pub(crate) fn reset_search_stats(&self) {
        *self.stats.lock() = ValueStats::default();
        self.status.reset();
    }

    /// Debug sweep: true when no node or low node under this one still
    /// carries an in-flight visit. Offenders are logged.
    pub fn zero_n_in_flight(&self) -> bool {
        let mut clean = true;
        if self.n_in_flight() != 0 {
            warn!("in-flight visits left on {:?}", self);
            clean = false;
        }
        if let Some(low) = self.low_node() {
            if low.n_in_flight() != 0 {
                warn!("in-flight visits left on {:?}", low);
                clean = false;
            }
        }
        for edge_and_node in self.edges() {
            if let Some(child) = edge_and_node.node() {
                clean &= child.zero_n_in_flight();
            }
        }
        clean
    }
}

impl<M: MoveToken> Drop for Node<M> {
    fn drop(&mut self) {
        if let Some(low_node) = self.low_node.swap(None) {
            low_node.remove_parent();
        }
    }
}

impl<M: MoveToken> fmt::Debug for Node<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.value_stats();
        let (lower, upper) = self.bounds();
        write!(
            f,
            "<Node> index:{} wl:{} d:{} m:{} n:{} n_in_flight:{} term:{:?} bounds:({},{})",
            self.index,
            stats.wl,
            stats.d,
            stats.m,
            stats.n,
            stats.n_in_flight,
            self.terminal_type(),
            lower.as_i8(),
            upper.as_i8(),
        )
    }
}

#[cfg(test)]
mod tests;
