//! Consumer-facing read APIs over the orchestrator and recovery boundary.

pub mod conference;
pub mod result;

pub use conference::ConferenceService;
pub use result::ServiceResult;
