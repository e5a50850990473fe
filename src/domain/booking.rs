use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::ids::{BookingId, SlotId, UserId, VenueId};

pub type BookingMetadata = HashMap<String, serde_json::Value>;

/// Booking status. `Pending` is deliberately absent — see DESIGN.md:
/// bookings are always minted straight to `Confirmed`, so there is no
/// observable pending state to carry.
///
/// Valid transitions: `Confirmed -> {Completed, NoShow}`, and any
/// non-terminal state `-> Cancelled`. `Completed`, `NoShow`, and
/// `Cancelled` are terminal and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow)
    }
}

/// A user's claim on `guest_count` units of a Slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub confirmation_code: String,
    pub user_id: UserId,
    pub slot_id: SlotId,
    pub venue_id: VenueId,
    pub guest_count: u32,
    pub notes: Option<String>,
    pub booking_date: NaiveDate,
    pub status: BookingStatus,
    pub total_price: Option<Decimal>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub metadata: BookingMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether this booking may be cancelled right now, given the slot's
    /// start time and the configured cancellation window.
    ///
    /// See DESIGN.md for why this fixes a version that computed a cutoff
    /// but never compared it to the slot's start time, which would have
    /// always returned true for any non-terminal booking. Here the
    /// comparison is not skipped: cancel is allowed only if
    /// `now + window < slot_start_time`.
    pub fn is_cancellable(&self, slot_start_time: DateTime<Utc>, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        !self.status.is_terminal() && now + window < slot_start_time
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancellation_reason = reason;
        self.updated_at = now;
    }
}

/// Generates a confirmation code: `RSV-` followed by the first 8
/// uppercase hex characters of a fresh UUIDv4. Length 12 total.
pub fn generate_confirmation_code() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("RSV-{}", raw[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_code_has_expected_shape() {
        let code = generate_confirmation_code();
        assert_eq!(code.len(), 12);
        assert!(code.starts_with("RSV-"));
        assert!(code[4..].chars().all(|c| c.is_ascii_hexdigit() && (c.is_ascii_digit() || c.is_uppercase())));
    }

    #[test]
    fn confirmation_codes_are_not_trivially_colliding() {
        let a = generate_confirmation_code();
        let b = generate_confirmation_code();
        assert_ne!(a, b);
    }

    #[test]
    fn is_cancellable_respects_the_window() {
        let now = Utc::now();
        let mut booking = sample_booking(now);
        let window = chrono::Duration::hours(24);

        let far_start = now + chrono::Duration::hours(48);
        assert!(booking.is_cancellable(far_start, now, window));

        let near_start = now + chrono::Duration::hours(12);
        assert!(!booking.is_cancellable(near_start, now, window));

        booking.cancel(None, now);
        assert!(!booking.is_cancellable(far_start, now, window));
    }

    fn sample_booking(now: DateTime<Utc>) -> Booking {
        Booking {
            id: BookingId::generate(),
            confirmation_code: generate_confirmation_code(),
            user_id: UserId::generate(),
            slot_id: SlotId::generate(),
            venue_id: VenueId::generate(),
            guest_count: 2,
            notes: None,
            booking_date: now.date_naive(),
            status: BookingStatus::Confirmed,
            total_price: None,
            confirmed_at: Some(now),
            cancelled_at: None,
            completed_at: None,
            cancellation_reason: None,
            metadata: BookingMetadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
