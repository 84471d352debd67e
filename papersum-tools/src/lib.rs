//! # papersum Tools
//!
//! Concrete collaborators for the papersum pipeline: a SQLite-backed work
//! source and summary sink, and a PDF excerpt source.

pub mod document;
pub mod store;

pub use document::PdfTextSource;
pub use store::{SqliteStore, StoreStatus};
