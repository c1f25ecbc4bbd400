//! Consistency validation for decoded cache entries.
//!
//! Decides whether an entry may be served as-is, served while refreshing
//! in the background, or must be replaced before use.

pub mod context;
pub mod outcome;
pub mod validator;

pub use context::{LiveSessionContext, ManualSessionContext, SessionContext};
pub use outcome::{Classification, Severity, ValidationOutcome};
pub use validator::{ConsistencyValidator, ValidationContext};
