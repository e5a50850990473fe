//! The transactional core: booking creation/cancellation, admin slot
//! control, and availability reads, wired against the Lock Manager,
//! storage, cache, job queue, and event bus through one injected
//! `Services` bundle.

mod booking_coordinator;
mod services;

pub use booking_coordinator::{CancelBookingInput, Coordinator, CreateBookingInput};
pub use services::Services;
