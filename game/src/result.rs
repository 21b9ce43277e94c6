use std::ops::Neg;

/// Outcome of a finished game, ordered from black's win to white's win so
/// that bound pairs can be compared directly.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum GameResult {
    BlackWon,
    Draw,
    WhiteWon,
}

impl GameResult {
    /// Signed form used in debug output: -1 for a black win, 0 for a draw,
    /// +1 for a white win.
    pub fn as_i8(self) -> i8 {
        match self {
            GameResult::BlackWon => -1,
            GameResult::Draw => 0,
            GameResult::WhiteWon => 1,
        }
    }
}

impl Neg for GameResult {
    type Output = Self;

    /// Swaps the winning side; a draw is its own negation.
    fn neg(self) -> Self {
        match self {
            GameResult::BlackWon => GameResult::WhiteWon,
            GameResult::Draw => GameResult::Draw,
            GameResult::WhiteWon => GameResult::BlackWon,
        }
    }
}
