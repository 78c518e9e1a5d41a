pub mod cancellation;
pub mod entities;
pub mod ports;

pub use cancellation::*;
pub use entities::*;
pub use ports::*;

pub use automl_errors::{AutoMlError, AutoMlResult};
