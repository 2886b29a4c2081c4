//! Type definitions for cx-service

mod error;
mod market;
mod rating;

pub use error::*;
pub use market::*;
pub use rating::*;
