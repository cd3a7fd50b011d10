pub mod fen;
pub mod material;
pub mod rating;
pub mod sampler;
pub mod session;
