pub mod local;

pub use local::{is_persisted, LocalVectorStore, StoredChunk, INDEX_FILE};
