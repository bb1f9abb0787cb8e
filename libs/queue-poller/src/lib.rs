pub mod client;
pub mod error;
pub mod poller;

pub use client::{QueueApi, QueueApiClient};
pub use error::ClientError;
pub use poller::{QueuePoller, RoleView, ViewData, ViewPhase, ViewState, MIN_POLL_INTERVAL};
