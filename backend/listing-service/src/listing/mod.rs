//! Listing engine: cursor codec, query compiler, geo ranker and the
//! orchestrator that ties them to a record store.

pub mod cursor;
pub mod geo;
pub mod orchestrator;
pub mod query;

pub use cursor::{Cursor, CursorCodec};
pub use orchestrator::ListingService;
pub use query::{CompiledQuery, GeoFilter, PageMode, Predicate, QueryCompiler, Term, TextField};
