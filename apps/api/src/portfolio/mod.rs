// Portfolio corpus: persisted similarity index, idempotent loading, skill matching.

pub mod embedding;
pub mod handlers;
pub mod index;
pub mod matcher;
pub mod store;
