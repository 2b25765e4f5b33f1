//! Domain scalar types with a canonical text form.

mod duration;
mod number;
mod size;

pub use duration::{Duration, ParseDurationError};
pub use number::Number;
pub use size::{ParseSizeError, Size};
