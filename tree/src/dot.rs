//! Graphviz rendering of a subtree. Observational only; nothing parses the
//! output. Low nodes render as boxes keyed by their address so
//! transpositions collapse into one box; every node renders as the edge
//! from its parent's box, with the move text flipped to the mover's
//! perspective level by level.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write;
use std::sync::Arc;

use game::MoveToken;

use crate::node::{LowNode, Node};

fn name_of<T>(ptr: *const T) -> String {
    format!("n_{:x}", ptr as usize)
}

fn low_node_string<M: MoveToken>(low: &Arc<LowNode<M>>) -> String {
    let stats = low.value_stats();
    let (lower, upper) = low.bounds();
    let mut out = String::new();
    let _ = write!(
        out,
        "{} [shape=box,label=\"WL={:+.3}\\lD={:.3}\\lM={:.3}\\lN={}\\l\"",
        name_of(Arc::as_ptr(low)),
        stats.wl,
        stats.d,
        stats.m,
        stats.n,
    );
    let _ = write!(
        out,
        ",tooltip=\"WL={:+.5}\\nD={:.5}\\nM={:.5}\\nN={}\\nNP={}\\nTerm={:?}\\nBounds={},{}\\n\"];",
        stats.wl,
        stats.d,
        stats.m,
        stats.n,
        low.num_parents(),
        low.terminal_type(),
        lower.as_i8(),
        upper.as_i8(),
    );
    out
}

fn edge_string<M: MoveToken>(node: &Arc<Node<M>>, as_opponent: bool) -> String {
    let parent = node.parent();
    let low = node.low_node();
    let stats = node.value_stats();
    let (lower, upper) = node.bounds();

    let from = match &parent {
        Some(parent) => name_of(Arc::as_ptr(parent)),
        None => "top".to_string(),
    };
    let to = match &low {
        Some(low) => name_of(Arc::as_ptr(low)),
        None => name_of(Arc::as_ptr(node)),
    };
    let move_text = match &parent {
        Some(parent) => parent
            .edge(usize::from(node.index()))
            .get_move(as_opponent)
            .to_string(),
        None => "N/A".to_string(),
    };
    let prior = parent
        .as_ref()
        .map_or(0.0, |parent| parent.edge(usize::from(node.index())).p());

    let mut out = String::new();
    let _ = write!(out, "{} -> {} [label=\"{}\\lN={}", from, to, move_text, stats.n);
    if node.is_two_fold_terminal() {
        out.push_str("\\lDRAW");
    }
    out.push_str("\\l\"");
    let _ = write!(
        out,
        ",labeltooltip=\"P={:.5}\\nWL={:+.5}\\nD={:.5}\\nM={:.5}\\nN={}\\nTerm={:?}\\nBounds={},{}\\n\"];",
        prior,
        stats.wl,
        stats.d,
        stats.m,
        stats.n,
        node.terminal_type(),
        lower.as_i8(),
        upper.as_i8(),
    );
    out
}

/// Renders the graph under `root` in the dot language. `as_opponent` flips
/// the perspective the root's own move is printed in.
pub fn graph_string<M: MoveToken>(root: &Arc<Node<M>>, as_opponent: bool) -> String {
    let mut out = String::new();
    out.push_str("strict digraph {\n");
    out.push_str("edge [headport=n,tooltip=\" \"];\n");
    out.push_str("node [shape=point,style=filled,fillcolor=ivory];\n");
    let _ = writeln!(
        out,
        "ranksep={:.3}",
        4.0 * f64::from(root.n().max(1)).log10()
    );

    let mut seen: HashSet<*const Node<M>> = HashSet::new();
    let mut frontier: VecDeque<(Arc<Node<M>>, bool)> = VecDeque::new();

    let _ = writeln!(out, "{}", edge_string(root, !as_opponent));
    seen.insert(Arc::as_ptr(root));
    frontier.push_back((root.clone(), as_opponent));

    while let Some((node, node_as_opponent)) = frontier.pop_front() {
        let Some(low) = node.low_node() else { continue };
        let _ = writeln!(out, "{}", low_node_string(&low));

        for edge_and_node in node.edges() {
            let Some(child) = edge_and_node.node().cloned() else {
                // Materialized children lead the edge order; the first bare
                // edge ends the row.
                break;
            };
            let _ = writeln!(out, "{}", edge_string(&child, node_as_opponent));
            if seen.insert(Arc::as_ptr(&child)) {
                frontier.push_back((child, !node_as_opponent));
            }
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use game::MoveToken;

    use crate::eval::NNEval;
    use crate::node::{LowNode, Node};

    use super::graph_string;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Mv(u16);

    impl std::fmt::Display for Mv {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "m{}", self.0)
        }
    }

    impl MoveToken for Mv {
        fn mirrored(self) -> Self {
            Mv(self.0 + 100)
        }
    }

    #[test]
    fn dump_contains_boxes_edges_and_moves() {
        let root = Arc::new(Node::new_root());
        let eval = NNEval::new([(Mv(7), 0.7), (Mv(8), 0.3)], 0.25, 0.1, 12.0);
        let mut low = LowNode::from_eval(&eval);
        low.sort_edges();
        let low = Arc::new(low);
        root.set_low_node(low.clone());

        let child = LowNode::get_or_spawn_child(&low, 0);
        assert!(child.try_start_score_update());
        child.finalize_score_update(0.5, 0.2, 10.0, 1);

        let dump = graph_string(&root, false);
        assert!(dump.starts_with("strict digraph {"));
        assert!(dump.ends_with("}\n"));
        assert!(dump.contains("shape=box"));
        assert!(dump.contains("top -> "));
        assert!(dump.contains("m7"));
        assert!(dump.contains("N=1"));
        // Opponent rendering mirrors the move text.
        let flipped = graph_string(&root, true);
        assert!(flipped.contains("m107"));
    }
}
