pub mod autocomplete;
pub mod browser;
pub mod cdp;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filler;
pub mod form;
pub mod lifecycle;
pub mod model;
pub mod page;
pub mod verify;
pub mod wait;

pub use config::LookupConfig;
pub use error::{FailureKind, LookupError, Result};
pub use lifecycle::{run, run_until};
pub use model::{AddressQuery, LookupOutcome, OutputFormat};
