//! Port implementations: Postgres for production, in-memory for tests and
//! local runs without a database.

pub mod memory;
pub mod postgres;

pub use memory::InMemorySettlementStore;
pub use postgres::PgSettlementStore;
