pub mod attribution;
pub mod chunk;
pub mod document;

pub use attribution::SourceAttribution;
pub use chunk::{Chunk, DocumentMeta};
pub use document::{Document, DocumentContent};
