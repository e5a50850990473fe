//! In-process publish/subscribe with per-topic filters, delivering
//! slot-availability and booking-status updates to long-lived
//! subscribers. Delivery is at-most-once, best-effort: loss is
//! acceptable because durable truth lives in storage.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::domain::booking::BookingStatus;
use crate::domain::slot::SlotStatus;
use crate::domain::{BookingId, SlotId, UserId, VenueId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub slot_id: SlotId,
    pub venue_id: VenueId,
    pub status: SlotStatus,
    pub remaining_capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingUpdate {
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub confirmation_code: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub enum Event {
    SlotUpdated(SlotUpdate),
    BookingUpdated(BookingUpdate),
}

/// `SlotUpdate`s are filtered by `venue_id`, `BookingUpdate`s by
/// `user_id`.
#[derive(Debug, Clone, Copy)]
pub enum Filter {
    ByVenue(VenueId),
    ByUser(UserId),
    Any,
}

impl Filter {
    fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Filter::Any, _) => true,
            (Filter::ByVenue(v), Event::SlotUpdated(s)) => s.venue_id == *v,
            (Filter::ByUser(u), Event::BookingUpdated(b)) => b.user_id == *u,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    SlotUpdated,
    BookingUpdated,
}

fn topic_of(event: &Event) -> Topic {
    match event {
        Event::SlotUpdated(_) => Topic::SlotUpdated,
        Event::BookingUpdated(_) => Topic::BookingUpdated,
    }
}

/// A lazy, cancellation-aware sequence of matching events. Dropping the
/// stream closes its channel; the subscription is reaped out of the
/// registry lazily, the next time `publish` tries to send to it.
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

pub trait EventBus: Send + Sync {
    fn subscribe(&self, topic: Topic, filter: Filter) -> EventStream;
    fn publish(&self, event: Event);
}

struct Subscription {
    topic: Topic,
    filter: Filter,
    sender: mpsc::Sender<Event>,
}

pub struct InMemoryEventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    buffer_size: usize,
}

impl InMemoryEventBus {
    pub fn new(buffer_size: usize) -> Self {
        InMemoryEventBus { subscriptions: RwLock::new(Vec::new()), buffer_size }
    }
}

impl EventBus for InMemoryEventBus {
    fn subscribe(&self, topic: Topic, filter: Filter) -> EventStream {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        self.subscriptions.write().expect("event bus lock poisoned").push(Subscription { topic, filter, sender });
        EventStream { receiver }
    }

    fn publish(&self, event: Event) {
        let topic = topic_of(&event);
        let mut subscriptions = self.subscriptions.write().expect("event bus lock poisoned");

        subscriptions.retain(|sub| {
            if sub.topic != topic || !sub.filter.matches(&event) {
                return true;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("event bus subscriber buffer full for topic {:?}, closing stream", topic);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl EventBus for Arc<InMemoryEventBus> {
    fn subscribe(&self, topic: Topic, filter: Filter) -> EventStream {
        (**self).subscribe(topic, filter)
    }

    fn publish(&self, event: Event) {
        (**self).publish(event)
    }
}
