//! Elo rating updates.

pub const K_FACTOR: f64 = 32.0;
pub const STARTING_RATING: i32 = 1200;

/// Expected score of a player rated `rating` against `opponent`.
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

/// Rating change for a player given their actual score (1.0, 0.5 or 0.0).
pub fn rating_delta(rating: i32, opponent: i32, score: f64) -> i32 {
    (K_FACTOR * (score - expected_score(rating, opponent))).round() as i32
}

/// Deltas for (white, black). `white_score` is 1.0 for a white win, 0.5 for a draw.
pub fn game_deltas(white: i32, black: i32, white_score: f64) -> (i32, i32) {
    (
        rating_delta(white, black, white_score),
        rating_delta(black, white, 1.0 - white_score),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_ratings() {
        assert_eq!(game_deltas(1200, 1200, 1.0), (16, -16));
        assert_eq!(game_deltas(1200, 1200, 0.5), (0, 0));
        assert_eq!(game_deltas(1200, 1200, 0.0), (-16, 16));
    }

    #[test]
    fn test_upset_pays_more() {
        let (underdog, favourite) = game_deltas(1000, 1400, 1.0);
        assert!(underdog > 16);
        assert!(favourite < -16);
        assert_eq!(underdog, -favourite);
    }
}
