pub mod detail;
pub mod interactions;

pub use detail::DetailService;
pub use interactions::{FlushReport, InteractionCoalescer};
