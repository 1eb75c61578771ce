use glam::I64Vec2;

/// Number of quadrants around a position.
pub const QUADRANTS: usize = 4;

/// Two-dimensional position of a moving entity.
///
/// All proximity decisions use the Chebyshev metric, so an area of interest
/// is a square rather than a disc. The previously reported coordinates are
/// kept alongside the current ones so that a move across an AOI boundary can
/// be detected after the update has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    current: I64Vec2,
    previous: I64Vec2,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        let point = I64Vec2::new(x, y);
        Self {
            current: point,
            previous: point,
        }
    }

    pub fn x(&self) -> i64 {
        self.current.x
    }

    pub fn y(&self) -> i64 {
        self.current.y
    }

    pub fn current(&self) -> I64Vec2 {
        self.current
    }

    pub fn previous(&self) -> I64Vec2 {
        self.previous
    }

    /// Chebyshev distance to another position.
    pub fn distance_to(&self, other: &Position) -> i64 {
        chebyshev(self.current, other.current)
    }

    /// Chebyshev distance from the previously recorded coordinates to
    /// another position's current coordinates.
    pub fn previous_distance_to(&self, other: &Position) -> i64 {
        chebyshev(self.previous, other.current)
    }

    /// Quadrant of `other` relative to this position.
    ///
    /// Bit 0 is set iff `other.x > self.x`, bit 1 iff `other.y > self.y`.
    /// Equal coordinates count as "not greater".
    pub fn quadrant_of(&self, other: &Position) -> usize {
        let mut quadrant = 0;
        if other.current.x > self.current.x {
            quadrant |= 1;
        }
        if other.current.y > self.current.y {
            quadrant |= 2;
        }
        quadrant
    }

    /// Moves to `target`, remembering the current coordinates as previous.
    pub fn advance(&mut self, target: I64Vec2) {
        self.previous = self.current;
        self.current = target;
    }
}

fn chebyshev(a: I64Vec2, b: I64Vec2) -> i64 {
    (a - b).abs().max_element()
}
