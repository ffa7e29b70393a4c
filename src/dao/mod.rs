/// Database model definitions.
pub mod models;
/// Quiz storage backends.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
