//! The reservation domain model: plain records plus free functions, no
//! class hierarchies — dynamic dispatch isn't needed here, the few
//! variants are sum types.

pub mod booking;
pub mod ids;
pub mod slot;
pub mod user;

pub use booking::{Booking, BookingMetadata, BookingStatus};
pub use ids::{BookingId, Id, SlotId, UserId, VenueId};
pub use slot::{Slot, SlotMetadata, SlotStatus};
pub use user::{Role, UserIdentity};
