//! Documents the two canonical tables backing the core. Nothing here
//! executes SQL — the shape is instead enforced by the `Slot`/`Booking`
//! struct definitions and the invariants they carry in
//! `storage::memory` — but the column-level contract is recorded once,
//! in one place, for anyone wiring a real relational store behind
//! `Storage`.
//!
//! ```text
//! slots
//!   id                  UUID PRIMARY KEY
//!   venue_id            UUID
//!   date                DATE
//!   start_time          TIMESTAMPTZ
//!   end_time            TIMESTAMPTZ                 CHECK (end_time > start_time)
//!   capacity            INT                         CHECK (capacity > 0)
//!   remaining_capacity  INT                         CHECK (remaining_capacity >= 0)
//!   status              ENUM
//!   price               NUMERIC(10,2) NULL
//!   currency            CHAR(3)
//!   held_until          TIMESTAMPTZ NULL
//!   metadata            JSON NULL
//!   created_at          TIMESTAMPTZ
//!   updated_at          TIMESTAMPTZ
//!
//!   INDEX (venue_id, date)
//!   INDEX (status, date)
//!
//! bookings
//!   id                  UUID PRIMARY KEY
//!   user_id             UUID
//!   slot_id             UUID
//!   venue_id            UUID
//!   confirmation_code   VARCHAR(12) UNIQUE
//!   status              ENUM
//!   guest_count         INT
//!   notes               TEXT NULL
//!   booking_date        DATE
//!   cancelled_at        TIMESTAMPTZ NULL
//!   cancellation_reason TEXT NULL
//!   confirmed_at        TIMESTAMPTZ NULL
//!   completed_at        TIMESTAMPTZ NULL
//!   total_price         NUMERIC(10,2) NULL
//!   metadata            JSON NULL
//!   created_at          TIMESTAMPTZ
//!   updated_at          TIMESTAMPTZ
//!
//!   INDEX (user_id)
//!   INDEX (slot_id)
//!   INDEX (status)
//!   UNIQUE (confirmation_code)
//!   INDEX (venue_id, booking_date)
//! ```
