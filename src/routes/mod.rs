pub mod decisions;
mod error;
pub mod health;

pub use error::ApiError;
