//! FEN helpers on top of shakmaty.

use shakmaty::{fen::Fen, CastlingMode, Chess, Color, EnPassantMode};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a playable standard-chess position.
pub fn parse_position(fen: &str) -> Result<Chess, String> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| format!("Invalid FEN: {e}"))?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| format!("Illegal position: {e}"))
}

/// Serialize a position to FEN.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
/// Two positions with the same key are repetitions of each other.
pub fn repetition_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Position;

    #[test]
    fn test_repetition_key() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        assert_eq!(
            repetition_key(fen),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -"
        );
    }

    #[test]
    fn test_parse_and_serialize_start() {
        let pos = parse_position(STANDARD_START_FEN).unwrap();
        assert_eq!(pos.turn(), Color::White);
        assert_eq!(to_fen(&pos), STANDARD_START_FEN);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_position("not a fen").is_err());
        // Side not to move is in check
        assert!(parse_position("4k3/4Q3/8/8/8/8/8/4K3 w - - 0 1").is_err());
    }
}
