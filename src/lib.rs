pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod hamming;
pub mod index;
pub mod library;
mod metrics;
pub mod pattern;
pub mod query;
mod server;

pub use catalog::{Catalog, Tag, TagCatalog, TagType};
pub use config::Opts;
pub use error::{EvaluationWarning, LibraryError, QueryError, SemanticError, SyntaxError};
pub use index::{Image, ImageId, TagIndex};
pub use library::{Library, LibraryBuilder, QueryOutput, ScoredImage, Snapshot};
