//! Reservation engine booking coordination core.
//!
//! Five cooperating components — Lock Manager, Availability Cache, Job
//! Queue, Booking Coordinator, Event Bus — plus the storage trait
//! contract the Coordinator assumes. See `coordinator::Coordinator` for
//! the entry point and `coordinator::Services` for how the five wire
//! together.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod events;
pub mod lock;
pub mod logger;
pub mod queue;
pub mod storage;
