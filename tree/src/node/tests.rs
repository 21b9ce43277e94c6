use std::sync::Arc;

use game::GameResult;

use crate::counting_game::{uniform_eval, CountingMove};
use crate::eval::NNEval;

use super::{LowNode, Node, TerminalType};

fn evaluated_low(q: f32, d: f32, m: f32) -> Arc<LowNode<CountingMove>> {
    let mut low = LowNode::from_eval(&uniform_eval(q, d, m));
    low.sort_edges();
    Arc::new(low)
}

fn visit(node: &Arc<Node<CountingMove>>, v: f32, d: f32, m: f32, multivisit: u32) {
    for _ in 0..multivisit {
        assert!(node.try_start_score_update());
    }
    node.finalize_score_update(v, d, m, multivisit);
}

#[test]
fn finalize_updates_running_means_and_counters() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);

    visit(&node, 0.5, 0.0, 4.0, 1);
    visit(&node, 0.0, 1.0, 2.0, 1);

    let stats = node.value_stats();
    assert_eq!(stats.n, 2);
    assert_eq!(stats.n_in_flight, 0);
    assert!((stats.wl - 0.25).abs() < 1e-9);
    assert!((stats.d - 0.5).abs() < 1e-6);
    assert!((stats.m - 3.0).abs() < 1e-6);
}

#[test]
fn multivisit_finalize_is_one_transition_of_n() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);

    visit(&node, 0.4, 0.1, 10.0, 3);

    let stats = node.value_stats();
    assert_eq!(stats.n, 3);
    assert_eq!(stats.n_in_flight, 0);
    assert!((stats.wl - f64::from(0.4f32)).abs() < 1e-9);
}

#[test]
fn first_visit_gate_blocks_until_finalized() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);

    assert!(node.try_start_score_update());
    // The node is being expanded; a second visitor must go elsewhere.
    assert!(!node.try_start_score_update());

    node.finalize_score_update(0.3, 0.1, 20.0, 1);
    assert_eq!(node.n(), 1);
    assert!((node.wl() - f64::from(0.3f32)).abs() < 1e-9);

    // With a completed visit the gate opens for concurrent visitors.
    assert!(node.try_start_score_update());
    assert_eq!(node.n_in_flight(), 1);
}

#[test]
fn cancel_score_update_returns_in_flight_visits() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);

    assert!(node.try_start_score_update());
    node.cancel_score_update(1);
    assert_eq!(node.n_in_flight(), 0);
    assert_eq!(node.n(), 0);
    assert!(node.try_start_score_update());
}

#[test]
#[should_panic(expected = "n_in_flight underflow")]
fn cancel_score_update_underflow_panics() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);
    node.cancel_score_update(1);
}

#[test]
fn adjust_for_terminal_shifts_means_without_touching_n() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);
    visit(&node, 0.5, 0.0, 0.0, 2);

    node.adjust_for_terminal(0.5, 0.0, 0.0, 1);

    let stats = node.value_stats();
    assert_eq!(stats.n, 2);
    assert!((stats.wl - 0.75).abs() < 1e-9);
}

#[test]
fn revert_terminal_visits_to_zero_resets_canonical_state() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);
    visit(&node, -0.5, 0.0, 0.0, 2);
    assert!((node.wl() + 0.5).abs() < 1e-9);

    node.revert_terminal_visits(-0.5, 0.0, 0.0, 2);

    let stats = node.value_stats();
    assert_eq!(stats.n, 0);
    assert_eq!(stats.wl, 0.0);
    assert_eq!(stats.d, 1.0);
    assert_eq!(stats.m, 0.0);
}

#[test]
fn revert_terminal_visits_partially_unwinds_the_mean() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);
    visit(&node, 0.3, 0.0, 0.0, 1);
    visit(&node, 0.6, 0.0, 0.0, 1);
    visit(&node, 0.9, 0.0, 0.0, 1);

    node.revert_terminal_visits(0.9, 0.0, 0.0, 1);

    let stats = node.value_stats();
    assert_eq!(stats.n, 2);
    assert!((stats.wl - 0.45).abs() < 1e-6);
}

#[test]
fn make_terminal_sets_eval_and_bounds_per_result() {
    let low = evaluated_low(0.0, 0.0, 0.0);

    low.make_terminal(GameResult::Draw, 5.0, TerminalType::EndOfGame);
    assert_eq!(low.wl(), 0.0);
    assert_eq!(low.d(), 1.0);
    assert_eq!(low.m(), 5.0);
    assert_eq!(low.bounds(), (GameResult::Draw, GameResult::Draw));
    assert_eq!(low.terminal_type(), TerminalType::EndOfGame);

    let other = evaluated_low(0.0, 0.0, 0.0);
    other.make_terminal(GameResult::WhiteWon, 1.0, TerminalType::Tablebase);
    assert_eq!(other.wl(), 1.0);
    assert_eq!(other.d(), 0.0);
    assert_eq!(
        other.bounds(),
        (GameResult::WhiteWon, GameResult::WhiteWon)
    );
    assert!(other.is_terminal());
}

#[test]
fn two_fold_terminal_keeps_bounds_open() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = LowNode::get_or_spawn_child(&low, 0);

    node.make_terminal(GameResult::Draw, 1.0, TerminalType::TwoFold);

    assert!(node.is_two_fold_terminal());
    assert_eq!(node.wl(), 0.0);
    assert_eq!(node.d(), 1.0);
    // Repetition is path-dependent; the position itself stays undecided.
    assert_eq!(
        node.bounds(),
        (GameResult::BlackWon, GameResult::WhiteWon)
    );
}

#[test]
fn loss_terminal_zeroes_prior_of_own_edge() {
    let eval = NNEval::new(
        [(CountingMove::Advance, 0.37), (CountingMove::Hold, 0.63)],
        0.0,
        0.0,
        0.0,
    );
    let mut low = LowNode::from_eval(&eval);
    low.sort_edges();
    let low = Arc::new(low);

    // After the sort the 0.37 edge sits at index 1.
    assert!((low.edge(1).p() - 0.37).abs() < 1e-3);
    let node = LowNode::get_or_spawn_child(&low, 1);

    node.make_terminal(GameResult::BlackWon, 3.0, TerminalType::EndOfGame);

    assert!(low.edge(1).p() < 1e-9);
    assert_eq!(node.wl(), -1.0);
    assert_eq!(node.d(), 0.0);
    assert_eq!(
        node.bounds(),
        (GameResult::BlackWon, GameResult::BlackWon)
    );
}

#[test]
fn loss_terminal_on_root_has_no_edge_to_clear() {
    let root: Node<CountingMove> = Node::new_root();
    root.make_terminal(GameResult::BlackWon, 3.0, TerminalType::EndOfGame);
    assert_eq!(root.wl(), -1.0);
}

#[test]
fn low_node_terminal_backup_reaggregates_visited_children() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());

    let child_a = LowNode::get_or_spawn_child(&low, 0);
    let child_b = LowNode::get_or_spawn_child(&low, 1);
    visit(&child_a, 0.4, 0.2, 10.0, 3);
    visit(&child_b, -0.1, 0.5, 12.0, 1);

    low.make_terminal(GameResult::Draw, 5.0, TerminalType::EndOfGame);
    low.make_not_terminal(&node);

    let stats = low.value_stats();
    assert_eq!(stats.n, 4);
    assert!((stats.wl - 0.275).abs() < 1e-6);
    assert!((stats.d - 0.275).abs() < 1e-6);
    assert!((stats.m - 10.5).abs() < 1e-6);
    assert_eq!(low.terminal_type(), TerminalType::NonTerminal);
    assert_eq!(
        low.bounds(),
        (GameResult::BlackWon, GameResult::WhiteWon)
    );
}

#[test]
fn low_node_terminal_backup_without_visits_leaves_zeros() {
    let low = evaluated_low(0.3, 0.1, 7.0);
    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());

    low.make_terminal(GameResult::Draw, 5.0, TerminalType::EndOfGame);
    low.make_not_terminal(&node);

    let stats = low.value_stats();
    assert_eq!(stats.n, 0);
    assert_eq!(stats.wl, 0.0);
    assert_eq!(stats.d, 0.0);
    assert_eq!(stats.m, 0.0);
    assert!(!low.is_terminal());
}

#[test]
fn node_not_terminal_takes_negated_low_perspective() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    low.finalize_score_update(0.6, 0.1, 8.0, 1);

    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());
    node.make_terminal(GameResult::Draw, 0.0, TerminalType::EndOfGame);

    node.make_not_terminal(false);

    assert_eq!(node.n(), low.n());
    assert!((node.wl() + low.wl()).abs() < 1e-9);
    assert_eq!(node.d(), low.d());
    assert!((node.m() - (low.m() + 1.0)).abs() < 1e-6);
    assert_eq!(
        node.bounds(),
        (GameResult::BlackWon, GameResult::WhiteWon)
    );
    assert!(!node.is_terminal());
}

#[test]
fn node_not_terminal_without_low_node_scrubs_to_zero() {
    let root: Node<CountingMove> = Node::new_root();
    root.make_terminal(GameResult::WhiteWon, 2.0, TerminalType::Tablebase);
    assert!(root.is_tb_terminal());

    root.make_not_terminal(true);

    let stats = root.value_stats();
    assert_eq!(stats.n, 0);
    assert_eq!(stats.wl, 0.0);
    assert_eq!(stats.d, 0.0);
    assert_eq!(stats.m, 0.0);
    assert_eq!(
        root.bounds(),
        (GameResult::BlackWon, GameResult::WhiteWon)
    );
}

#[test]
fn make_not_terminal_twice_equals_once() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());

    let child = LowNode::get_or_spawn_child(&low, 0);
    visit(&child, 0.2, 0.3, 6.0, 2);

    low.make_terminal(GameResult::Draw, 5.0, TerminalType::EndOfGame);
    node.make_terminal(GameResult::Draw, 6.0, TerminalType::EndOfGame);

    node.make_not_terminal(true);
    let once = node.value_stats();
    let once_low = low.value_stats();

    node.make_not_terminal(true);
    let twice = node.value_stats();
    let twice_low = low.value_stats();

    assert_eq!(once.n, twice.n);
    assert_eq!(once.wl.to_bits(), twice.wl.to_bits());
    assert_eq!(once.d.to_bits(), twice.d.to_bits());
    assert_eq!(once.m.to_bits(), twice.m.to_bits());
    assert_eq!(once_low.n, twice_low.n);
    assert_eq!(once_low.wl.to_bits(), twice_low.wl.to_bits());
}

#[test]
#[should_panic(expected = "low node is already set")]
fn setting_a_low_node_twice_panics() {
    let node: Node<CountingMove> = Node::new_root();
    node.set_low_node(evaluated_low(0.0, 0.0, 0.0));
    node.set_low_node(evaluated_low(0.0, 0.0, 0.0));
}

#[test]
#[should_panic(expected = "edge index out of range")]
fn spawning_outside_the_edge_array_panics() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    LowNode::get_or_spawn_child(&low, 3);
}

#[test]
#[should_panic(expected = "edges are frozen")]
fn sorting_after_children_materialized_panics() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    LowNode::get_or_spawn_child(&low, 0);
    let mut low = Arc::try_unwrap(low).ok().unwrap();
    low.sort_edges();
}

#[test]
fn second_parent_marks_a_sticky_transposition() {
    let low = evaluated_low(0.0, 0.0, 0.0);

    let first = Arc::new(Node::new_root());
    first.set_low_node(low.clone());
    assert_eq!(low.num_parents(), 1);
    assert!(!low.is_transposition());

    let second = Arc::new(Node::new_root());
    second.set_low_node(low.clone());
    assert_eq!(low.num_parents(), 2);
    assert!(low.is_transposition());

    second.unset_low_node();
    assert_eq!(low.num_parents(), 1);
    // Once a transposition, always a transposition.
    assert!(low.is_transposition());
}

#[test]
fn dropping_a_parent_node_returns_its_parent_slot() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    {
        let holder = Arc::new(Node::new_root());
        holder.set_low_node(low.clone());
        assert_eq!(low.num_parents(), 1);
    }
    assert_eq!(low.num_parents(), 0);
}

#[test]
fn set_low_node_carries_in_flight_visits_to_the_low_node() {
    let node: Node<CountingMove> = Node::new_root();
    assert!(node.try_start_score_update());

    let low = evaluated_low(0.0, 0.0, 0.0);
    node.set_low_node(low.clone());

    assert_eq!(low.n_in_flight(), 1);
}

#[test]
fn increment_n_in_flight_propagates_to_the_low_node() {
    let node: Node<CountingMove> = Node::new_root();
    node.increment_n_in_flight(2);
    assert_eq!(node.n_in_flight(), 2);

    let low = evaluated_low(0.0, 0.0, 0.0);
    node.set_low_node(low.clone());
    node.increment_n_in_flight(3);

    assert_eq!(node.n_in_flight(), 5);
    // AddParent carried the 2 already in flight; the increment adds 3 more.
    assert_eq!(low.n_in_flight(), 5);
}

#[test]
fn visited_policy_sums_priors_of_visited_children() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());

    let child_a = LowNode::get_or_spawn_child(&low, 0);
    let child_b = LowNode::get_or_spawn_child(&low, 1);
    LowNode::get_or_spawn_child(&low, 2);
    visit(&child_a, 0.1, 0.0, 0.0, 1);
    visit(&child_b, 0.1, 0.0, 0.0, 1);

    // Priors 0.5 + 0.3 visited, 0.2 not.
    assert!((node.visited_policy() - 0.8).abs() < 1e-3);
}

#[test]
fn children_visits_excludes_the_evaluation_visit() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let node = Arc::new(Node::new_root());
    node.set_low_node(low.clone());

    low.finalize_score_update(0.2, 0.1, 3.0, 1);
    low.finalize_score_update(0.1, 0.1, 2.0, 1);
    low.finalize_score_update(0.3, 0.1, 1.0, 1);

    assert_eq!(low.n(), 3);
    assert_eq!(low.children_visits(), 2);
    assert_eq!(node.total_visits(), 3);
}

#[test]
fn zero_n_in_flight_sweep_finds_leftover_virtual_loss() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let root = Arc::new(Node::new_root());
    root.set_low_node(low.clone());

    let child = LowNode::get_or_spawn_child(&low, 0);
    assert!(child.try_start_score_update());
    assert!(!root.zero_n_in_flight());

    child.finalize_score_update(0.1, 0.0, 0.0, 1);
    assert!(root.zero_n_in_flight());
}

#[test]
fn low_node_from_eval_of_reuses_eval_but_not_state() {
    let source = evaluated_low(0.4, 0.2, 9.0);
    source.finalize_score_update(0.7, 0.1, 3.0, 1);
    source.make_terminal(GameResult::Draw, 2.0, TerminalType::TwoFold);
    let before = source.value_stats();

    let copy = LowNode::from_eval_of(&source);

    let stats = copy.value_stats();
    assert_eq!(stats.n, 0);
    assert_eq!(stats.n_in_flight, 0);
    assert_eq!(stats.wl.to_bits(), before.wl.to_bits());
    assert_eq!(stats.d.to_bits(), before.d.to_bits());
    assert_eq!(stats.m.to_bits(), before.m.to_bits());
    assert!(!copy.is_terminal());
    assert_eq!(copy.num_parents(), 0);
    assert_eq!(copy.num_edges(), source.num_edges());
    for (a, b) in copy.edges().iter().zip(source.edges().iter()) {
        assert_eq!(a.get_move(false), b.get_move(false));
        assert_eq!(a.p(), b.p());
    }
}

#[test]
fn copy_policy_fills_a_prefix_of_decoded_priors() {
    let low = evaluated_low(0.0, 0.0, 0.0);
    let mut out = [0.0f32; 2];
    low.copy_policy(&mut out);
    assert!((out[0] - 0.5).abs() < 1e-3);
    assert!((out[1] - 0.3).abs() < 1e-3);
}
