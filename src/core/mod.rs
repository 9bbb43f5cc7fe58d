pub mod error;
pub mod value;

pub use error::{RestError, Result};
pub use value::Value;
