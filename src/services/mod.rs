//! Services for response aggregation and value normalization

pub mod aggregator;
pub mod normalizer;

pub use aggregator::Aggregator;
pub use normalizer::{coerce_number, parse_timestamp, round2, shape_rows};
