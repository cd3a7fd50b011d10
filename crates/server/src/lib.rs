pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod matchmaking;
pub mod positions;
pub mod protocol;
pub mod routes;
pub mod store;
