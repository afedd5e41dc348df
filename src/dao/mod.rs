/// Built-in question catalogue.
pub mod catalogue;
/// Transactional storage backends.
pub mod game_store;
/// Database model definitions.
pub mod models;
/// Storage errors and retry policy.
pub mod storage;
