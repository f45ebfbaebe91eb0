pub mod preset;
pub mod schedule;
pub mod store;
