pub mod connection;
pub mod repository;

pub use repository::{IndexRepository, NewChunk, StoredChunk};
