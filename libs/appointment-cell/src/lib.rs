pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Actor, Appointment, AppointmentError, AppointmentStatus, AppointmentType};
pub use router::appointment_routes;
pub use services::booking::AppointmentBookingService;
pub use services::directory::{DoctorDirectory, InMemoryDoctorDirectory};
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::store::{AppointmentStore, InMemoryAppointmentStore};
