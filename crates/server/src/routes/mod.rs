pub mod auth;
pub mod games;
pub mod generate;
pub mod health;
pub mod lobby;
pub mod play_ws;
pub mod status;
