//! Material accounting and the pre-engine imbalance gate.

use shakmaty::{Board, Color, Role};

pub fn material_value(role: Role) -> u32 {
    match role {
        Role::Pawn => 1,
        Role::Knight => 3,
        Role::Bishop => 3,
        Role::Rook => 5,
        Role::Queen => 9,
        Role::King => 0,
    }
}

fn count(board: &Board, role: Role, color: Color) -> u32 {
    (board.by_role(role) & board.by_color(color)).count() as u32
}

/// Total point value of one side's pieces (kings excluded).
pub fn side_material(board: &Board, color: Color) -> u32 {
    [Role::Pawn, Role::Knight, Role::Bishop, Role::Rook, Role::Queen]
        .into_iter()
        .map(|role| count(board, role, color) * material_value(role))
        .sum()
}

/// Per-side material plus major/minor piece counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialBalance {
    pub white: u32,
    pub black: u32,
    pub white_majors: u32,
    pub black_majors: u32,
    pub white_minors: u32,
    pub black_minors: u32,
}

impl MaterialBalance {
    pub fn of(board: &Board) -> Self {
        let majors = |c| count(board, Role::Rook, c) + count(board, Role::Queen, c);
        let minors = |c| count(board, Role::Knight, c) + count(board, Role::Bishop, c);
        Self {
            white: side_material(board, Color::White),
            black: side_material(board, Color::Black),
            white_majors: majors(Color::White),
            black_majors: majors(Color::Black),
            white_minors: minors(Color::White),
            black_minors: minors(Color::Black),
        }
    }

    pub fn difference(&self) -> u32 {
        self.white.abs_diff(self.black)
    }

    /// True when the point gap is large enough and at least one piece class
    /// (majors or minors) is out of balance, so pawns alone never qualify.
    pub fn passes_gate(&self, min_difference: u32, min_piece_difference: u32) -> bool {
        let major_diff = self.white_majors.abs_diff(self.black_majors);
        let minor_diff = self.white_minors.abs_diff(self.black_minors);
        self.difference() >= min_difference
            && (major_diff >= min_piece_difference || minor_diff >= min_piece_difference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::parse_position;
    use shakmaty::Position;

    #[test]
    fn test_side_material() {
        let pos = parse_position(crate::fen::STANDARD_START_FEN).unwrap();
        assert_eq!(side_material(pos.board(), Color::White), 39);
        assert_eq!(side_material(pos.board(), Color::Black), 39);
    }

    #[test]
    fn test_gate_accepts_piece_imbalance() {
        // White: Q + R, Black: R + 3 pawns
        let pos = parse_position("4k3/ppp5/8/8/8/8/8/QR2K2r w - - 0 30").unwrap();
        let balance = MaterialBalance::of(pos.board());
        assert_eq!(balance.white, 14);
        assert_eq!(balance.black, 8);
        assert!(balance.passes_gate(3, 1));
    }

    #[test]
    fn test_gate_rejects_pawn_only_gap() {
        // Same pieces on both sides, white has four extra pawns
        let pos = parse_position("4k3/8/8/8/8/8/PPPP4/R3K2r w - - 0 30").unwrap();
        let balance = MaterialBalance::of(pos.board());
        assert_eq!(balance.difference(), 4);
        assert!(!balance.passes_gate(3, 1));
    }

    #[test]
    fn test_gate_rejects_small_gap() {
        // Knight + bishop each
        let pos = parse_position("4k3/8/8/8/8/8/8/NB2K1nb w - - 0 30").unwrap();
        let balance = MaterialBalance::of(pos.board());
        assert_eq!(balance.difference(), 0);
        assert!(!balance.passes_gate(3, 1));
    }
}
