use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::ids::{SlotId, VenueId};

pub type SlotMetadata = HashMap<String, serde_json::Value>;

/// Slot status. Transitions are total functions on `Slot`, not a class
/// hierarchy — see `Slot::debit`/`credit`/`block`/`unblock`/`hold`/
/// `expire_hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
    Blocked,
}

/// A bookable time window at a venue.
///
/// Invariants:
/// - `0 <= remaining_capacity <= capacity`
/// - `status == Booked` implies `remaining_capacity == 0`
/// - `status == Available` implies `remaining_capacity > 0` and `start_time` in the future
/// - `status == Blocked` cannot transition via booking, only via admin
/// - capacity never decreases below the sum of guest counts over non-cancelled bookings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub venue_id: VenueId,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub remaining_capacity: u32,
    pub status: SlotStatus,
    /// `NUMERIC(10,2)` in the storage schema; `Decimal` avoids
    /// floating-point drift on money.
    pub unit_price: Option<Decimal>,
    pub currency: Option<String>,
    pub held_until: Option<DateTime<Utc>>,
    pub metadata: SlotMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Snapshot used by the Availability Cache and `GetAvailableSlots`.
    pub fn matches_availability_filter(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Available && self.remaining_capacity > 0 && self.start_time > now
    }

    /// Debits `guest_count` units of capacity. Caller must have already
    /// validated the full precondition gauntlet; this only performs the
    /// capacity/status state transition.
    pub fn debit(&mut self, guest_count: u32, now: DateTime<Utc>) {
        debug_assert!(guest_count <= self.remaining_capacity);
        self.remaining_capacity -= guest_count;
        if self.remaining_capacity == 0 {
            self.status = SlotStatus::Booked;
        }
        self.updated_at = now;
    }

    /// Credits `guest_count` units back (cancellation path). Flips
    /// `Booked` back to `Available` once capacity is freed.
    pub fn credit(&mut self, guest_count: u32, now: DateTime<Utc>) {
        self.remaining_capacity = (self.remaining_capacity + guest_count).min(self.capacity);
        if self.status == SlotStatus::Booked && self.remaining_capacity > 0 {
            self.status = SlotStatus::Available;
        }
        self.updated_at = now;
    }

    /// Admin block. No-op if already blocked.
    pub fn block(&mut self, now: DateTime<Utc>) {
        self.status = SlotStatus::Blocked;
        self.updated_at = now;
    }

    /// Admin unblock. Idempotent — restores to Available regardless of
    /// whether it was already Available.
    pub fn unblock(&mut self, now: DateTime<Utc>) {
        self.status = SlotStatus::Available;
        self.updated_at = now;
    }

    /// Places a hold with the given expiry. `capacity`/`remaining_capacity`
    /// are untouched here — `spec.md`'s Slot attributes carry only
    /// `heldUntil`, with no separate held-quantity field, so a hold marks
    /// the slot unbookable without a capacity debit of its own. No path in
    /// this crate currently calls this (see DESIGN.md); the pairing with
    /// `expire_hold` exists so a future two-phase hold flow can use it
    /// directly.
    pub fn hold(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = SlotStatus::Held;
        self.held_until = Some(until);
        self.updated_at = now;
    }

    /// Reverts an expired hold back to Available. Capacity is untouched —
    /// see `hold` — so this is purely a status/`held_until` transition.
    /// Invoked only by the `slot:reclaim-expired-holds` job.
    pub fn expire_hold(&mut self, now: DateTime<Utc>) {
        self.status = SlotStatus::Available;
        self.held_until = None;
        self.updated_at = now;
    }
}
