//! Repository backends for scheduled deployments.
//!
//! Two implementations of the engine's `Repository` seam: a sqlx/Postgres
//! backend for real deployments and an in-memory backend for tests and
//! local runs without a database.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;
