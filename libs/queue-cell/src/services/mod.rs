pub mod access;
pub mod engine;
pub mod session;
pub mod transition;

pub use engine::QueueEngine;
pub use session::DoctorDailySession;
pub use transition::StatusTransitionController;
