pub mod error;
pub mod progress;
pub mod subprocess;

pub use error::UtilError;

pub type Result<T> = std::result::Result<T, UtilError>;
