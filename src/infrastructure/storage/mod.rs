//! Storage backends shared by the repositories

mod postgres;

pub use postgres::{connect_pool, PostgresConfig};
