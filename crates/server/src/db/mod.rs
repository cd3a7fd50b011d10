pub mod accounts;
pub mod games;
pub mod pool;
