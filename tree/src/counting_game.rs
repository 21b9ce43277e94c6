//! Toy game backing the tree tests: the side to move nudges a shared
//! counter toward its own goal. Moves are stored from the mover's
//! perspective, so mirroring swaps direction the way a board flip does.

use std::fmt;

use game::{MoveToken, Position};

use crate::eval::NNEval;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountingMove {
    Advance,
    Retreat,
    Hold,
}

impl fmt::Display for CountingMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CountingMove::Advance => "advance",
            CountingMove::Retreat => "retreat",
            CountingMove::Hold => "hold",
        };
        f.write_str(text)
    }
}

impl MoveToken for CountingMove {
    fn mirrored(self) -> Self {
        match self {
            CountingMove::Advance => CountingMove::Retreat,
            CountingMove::Retreat => CountingMove::Advance,
            CountingMove::Hold => CountingMove::Hold,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountingPosition {
    pub count: i32,
    pub black_to_move: bool,
    pub ply: u32,
}

impl CountingPosition {
    pub fn start(count: i32) -> Self {
        Self {
            count,
            black_to_move: false,
            ply: 0,
        }
    }
}

impl Position for CountingPosition {
    type Move = CountingMove;

    fn is_black_to_move(&self) -> bool {
        self.black_to_move
    }

    fn ply(&self) -> u32 {
        self.ply
    }

    fn is_same_move(&self, a: CountingMove, b: CountingMove) -> bool {
        a == b
    }

    fn canonical_move(&self, mv: CountingMove) -> CountingMove {
        mv
    }

    fn apply_move(&self, mv: CountingMove) -> Self {
        let count = match mv {
            CountingMove::Advance => self.count + 1,
            CountingMove::Retreat => self.count - 1,
            CountingMove::Hold => self.count,
        };
        Self {
            count,
            black_to_move: !self.black_to_move,
            ply: self.ply + 1,
        }
    }

    fn same_start(&self, other: &Self) -> bool {
        self.count == other.count && self.black_to_move == other.black_to_move
    }
}

/// Network-shaped eval over all three moves with fixed priors.
pub fn uniform_eval(q: f32, d: f32, m: f32) -> NNEval<CountingMove> {
    NNEval::new(
        [
            (CountingMove::Advance, 0.5),
            (CountingMove::Retreat, 0.3),
            (CountingMove::Hold, 0.2),
        ],
        q,
        d,
        m,
    )
}
