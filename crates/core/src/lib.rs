//! Shared building blocks for `deploy-tool`: option maps, `{{key}}` macro
//! substitution and the counted deploy log.

pub mod error;
pub mod logger;
pub mod macros;
pub mod options;

pub use error::CoreError;
pub use logger::Logger;
pub use options::Options;
