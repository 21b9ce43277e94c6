use crate::MoveToken;

/// A game position as the search core needs to see it: side to move, move
/// identity across encodings, and successor application. Rules, legality and
/// terminal detection stay with the implementor.
pub trait Position: Clone + Send + Sync + 'static {
    type Move: MoveToken;

    fn is_black_to_move(&self) -> bool;

    /// Number of half-moves played from the start of the game.
    fn ply(&self) -> u32;

    /// Whether two move tokens denote the same legal move in this position.
    /// Implementations may accept several encodings of one move.
    fn is_same_move(&self, a: Self::Move, b: Self::Move) -> bool;

    /// The preferred encoding of a move in this position.
    fn canonical_move(&self, mv: Self::Move) -> Self::Move;

    /// The position after playing `mv`.
    fn apply_move(&self, mv: Self::Move) -> Self;

    /// Whether `other` could start the same game: identical board setup and
    /// identical draw-rule clocks. Positions that differ here can never share
    /// a search tree.
    fn same_start(&self, other: &Self) -> bool;
}
