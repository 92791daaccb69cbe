//! Types used when reading objects back out of the store

pub mod database_entry;
pub mod tree_walk;
