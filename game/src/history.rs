use crate::Position;

/// The sequence of positions of the current game, oldest first.
#[derive(Clone, Debug, Default)]
pub struct PositionHistory<P: Position> {
    positions: Vec<P>,
}

impl<P: Position> PositionHistory<P> {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
        }
    }

    /// Drops all recorded positions and restarts from `start`.
    pub fn reset(&mut self, start: P) {
        self.positions.clear();
        self.positions.push(start);
    }

    /// Plays `mv` on the last position and records the successor.
    pub fn append(&mut self, mv: P::Move) {
        let next = self.last().apply_move(mv);
        self.positions.push(next);
    }

    pub fn starting(&self) -> &P {
        self.positions.first().expect("history is empty")
    }

    pub fn last(&self) -> &P {
        self.positions.last().expect("history is empty")
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
