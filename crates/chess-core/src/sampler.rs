//! Random material-imbalanced position sampler.
//!
//! Builds a position from an empty board: two kings, then a strong and a weak
//! allotment of pieces drawn from one side's starting army. Legality is left
//! to shakmaty; anything it refuses is reported as a [`Rejection`].

use std::num::NonZeroU32;
use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::Rng;
use shakmaty::{
    Bitboard, Board, CastlingMode, Chess, Color, FromSetup, Position, Role, Setup, Square,
};

use crate::fen::to_fen;
use crate::material::{material_value, MaterialBalance};

/// Pieces available to each side: one of everything except the king,
/// with six pawns instead of eight.
const PIECE_POOL: [Role; 13] = [
    Role::Queen,
    Role::Rook,
    Role::Rook,
    Role::Bishop,
    Role::Bishop,
    Role::Knight,
    Role::Knight,
    Role::Pawn,
    Role::Pawn,
    Role::Pawn,
    Role::Pawn,
    Role::Pawn,
    Role::Pawn,
];

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Material target of the stronger side, before clamping.
    pub strong_material: RangeInclusive<u32>,
    /// How much less the weaker side aims for.
    pub material_gap: RangeInclusive<u32>,
    pub max_material_per_side: u32,
    /// Minimum Chebyshev distance between the two kings.
    pub min_king_distance: u32,
    /// Cosmetic fullmove number range.
    pub fullmove_range: RangeInclusive<u32>,
    pub excluded_roles: Vec<Role>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strong_material: 17..=22,
            material_gap: 3..=6,
            max_material_per_side: 22,
            min_king_distance: 2,
            fullmove_range: 10..=50,
            excluded_roles: Vec::new(),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), String> {
        let pool_total: u32 = PIECE_POOL.iter().map(|r| material_value(*r)).sum();

        if self.strong_material.is_empty() {
            return Err("strong_material range is empty".into());
        }
        if self.material_gap.is_empty() {
            return Err("material_gap range is empty".into());
        }
        if self.max_material_per_side == 0 || self.max_material_per_side > pool_total {
            return Err(format!(
                "max_material_per_side must be between 1 and {pool_total}"
            ));
        }
        if !(1..=7).contains(&self.min_king_distance) {
            return Err("min_king_distance must be between 1 and 7".into());
        }
        if self.fullmove_range.is_empty() || *self.fullmove_range.start() == 0 {
            return Err("fullmove_range must be a non-empty range starting at 1 or more".into());
        }
        if self.excluded_roles.contains(&Role::King) {
            return Err("kings cannot be excluded".into());
        }
        Ok(())
    }
    /// Upper bound on the material gap between the two sides. The weak side
    /// aims at most `material_gap` below the strong side, and the greedy fill
    /// ends short of its target by less than the largest piece left in play.
    pub fn max_material_difference(&self) -> u32 {
        let largest = PIECE_POOL
            .iter()
            .filter(|role| !self.excluded_roles.contains(role))
            .map(|role| material_value(*role))
            .max()
            .unwrap_or(0);
        let strong_max = (*self.strong_material.end()).min(self.max_material_per_side);
        (*self.material_gap.end() + largest.saturating_sub(1)).min(strong_max)
    }
}

/// A sampled position that the rules library accepted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub position: Chess,
    pub fen: String,
    pub balance: MaterialBalance,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no square far enough from the first king")]
    KingPlacement,

    #[error("rejected by rules library: {0}")]
    Illegal(String),

    #[error("position is already decided")]
    Decided,
}

fn chebyshev_distance(a: Square, b: Square) -> u32 {
    let file_diff = (a.file() as i32 - b.file() as i32).unsigned_abs();
    let rank_diff = (a.rank() as i32 - b.rank() as i32).unsigned_abs();
    file_diff.max(rank_diff)
}

fn is_light(sq: Square) -> bool {
    Bitboard::LIGHT_SQUARES.contains(sq)
}

/// Greedily draw pieces from a shuffled pool until the side sits within one
/// point of `target`. A piece that would overshoot is skipped, not retried.
pub fn draw_pieces<R: Rng>(target: u32, excluded: &[Role], rng: &mut R) -> Vec<Role> {
    let mut pool: Vec<Role> = PIECE_POOL
        .iter()
        .copied()
        .filter(|role| !excluded.contains(role))
        .collect();
    pool.shuffle(rng);

    let mut current = 0;
    let mut pieces = Vec::new();
    for role in pool {
        let value = material_value(role);
        if current + value <= target {
            pieces.push(role);
            current += value;
        }
        if current >= target.saturating_sub(1) {
            break;
        }
    }
    pieces
}

/// Returns (strong, weak) piece lists.
pub fn allot_material<R: Rng>(config: &SamplerConfig, rng: &mut R) -> (Vec<Role>, Vec<Role>) {
    let strong_target = rng
        .random_range(config.strong_material.clone())
        .min(config.max_material_per_side);
    let weak_target = strong_target
        .saturating_sub(rng.random_range(config.material_gap.clone()))
        .min(config.max_material_per_side);

    (
        draw_pieces(strong_target, &config.excluded_roles, rng),
        draw_pieces(weak_target, &config.excluded_roles, rng),
    )
}

/// Sample one candidate position.
pub fn sample_candidate<R: Rng>(
    config: &SamplerConfig,
    rng: &mut R,
) -> Result<Candidate, Rejection> {
    let mut squares: Vec<Square> = Bitboard::FULL.into_iter().collect();
    let mut board = Board::empty();

    // Kings first
    let white_king = squares.swap_remove(rng.random_range(0..squares.len()));
    let king_options: Vec<usize> = squares
        .iter()
        .enumerate()
        .filter(|(_, sq)| chebyshev_distance(white_king, **sq) >= config.min_king_distance)
        .map(|(i, _)| i)
        .collect();
    if king_options.is_empty() {
        return Err(Rejection::KingPlacement);
    }
    let black_king = squares.swap_remove(king_options[rng.random_range(0..king_options.len())]);
    board.set_piece_at(white_king, Role::King.of(Color::White));
    board.set_piece_at(black_king, Role::King.of(Color::Black));

    let (strong, weak) = allot_material(config, rng);
    let (white_pieces, black_pieces) = if rng.random_bool(0.5) {
        (strong, weak)
    } else {
        (weak, strong)
    };

    for (color, pieces) in [(Color::White, white_pieces), (Color::Black, black_pieces)] {
        let mut light_bishop = false;
        let mut dark_bishop = false;

        for role in pieces {
            let allowed: Vec<usize> = squares
                .iter()
                .enumerate()
                .filter(|(_, sq)| match role {
                    Role::Pawn => !Bitboard::BACKRANKS.contains(**sq),
                    Role::Bishop => {
                        if is_light(**sq) {
                            !light_bishop
                        } else {
                            !dark_bishop
                        }
                    }
                    _ => true,
                })
                .map(|(i, _)| i)
                .collect();
            if allowed.is_empty() {
                continue;
            }

            let sq = squares.swap_remove(allowed[rng.random_range(0..allowed.len())]);
            if role == Role::Bishop {
                if is_light(sq) {
                    light_bishop = true;
                } else {
                    dark_bishop = true;
                }
            }
            board.set_piece_at(sq, role.of(color));
        }
    }

    let mut setup = Setup::empty();
    setup.board = board;
    setup.turn = if rng.random_bool(0.5) {
        Color::White
    } else {
        Color::Black
    };
    setup.halfmoves = 0;
    setup.fullmoves =
        NonZeroU32::new(rng.random_range(config.fullmove_range.clone())).unwrap_or(NonZeroU32::MIN);

    // from_setup refuses positions where the side not to move is in check
    let position = Chess::from_setup(setup, CastlingMode::Standard)
        .map_err(|e| Rejection::Illegal(e.to_string()))?;

    if position.is_game_over() {
        return Err(Rejection::Decided);
    }

    let balance = MaterialBalance::of(position.board());
    let fen = to_fen(&position);

    Ok(Candidate {
        position,
        fen,
        balance,
    })
}
