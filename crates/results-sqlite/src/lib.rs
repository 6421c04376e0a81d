//! SQLite persistence for scan jobs and their item results.

mod insert;
mod models;
mod open;
mod query;
mod schema;
mod store;

pub use open::Db;
pub use schema::SCHEMA_VERSION;
