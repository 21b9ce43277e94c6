use std::fmt::{Debug, Display};

/// A move in the mover's own encoding. Moves are stored from the point of
/// view of the player making them, so presenting one to the opponent goes
/// through `mirrored`.
pub trait MoveToken: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// The same move seen from the other side of the board.
    fn mirrored(self) -> Self;
}
