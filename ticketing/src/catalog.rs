//! Event catalog with atomic capacity accounting.
//!
//! The catalog is shared by every purchase session. Event details never
//! change after load; only the sold and held counts do. Both counts of one
//! event live in a single `AtomicU64` (sold in the high half, held in the
//! low half), so a capacity check and the increment that depends on it are
//! one compare-and-swap:
//!
//! ```text
//! available = max_tickets - sold - held
//!
//! hold:    available > 0  →  held += 1          (else SoldOut)
//! commit:                    held -= 1, sold += 1
//! release:                   held -= 1
//! ```
//!
//! A [`SeatHold`] is released when dropped unless it was committed, so an
//! aborted or failed purchase never leaks a reserved seat.

use crate::error::PurchaseError;
use crate::types::{Amount, Event, EventId};
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const fn pack(sold: u32, held: u32) -> u64 {
    ((sold as u64) << 32) | held as u64
}

#[allow(clippy::cast_possible_truncation)] // Halves of a packed u64
const fn unpack(counts: u64) -> (u32, u32) {
    ((counts >> 32) as u32, counts as u32)
}

const fn has_room(sold: u32, held: u32, max: u32) -> bool {
    (sold as u64) + (held as u64) < max as u64
}

struct Slot {
    event: Event,
    counts: AtomicU64,
}

impl Slot {
    fn snapshot(&self) -> Event {
        let (sold, _) = unpack(self.counts.load(Ordering::Acquire));
        Event {
            sold_tickets: sold,
            ..self.event.clone()
        }
    }

    /// Apply `f` to (sold, held) atomically; `None` from `f` leaves counts untouched.
    fn update<F>(&self, f: F) -> Result<(u32, u32), (u32, u32)>
    where
        F: Fn(u32, u32) -> Option<(u32, u32)>,
    {
        self.counts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |counts| {
                let (sold, held) = unpack(counts);
                f(sold, held).map(|(sold, held)| pack(sold, held))
            })
            .map(unpack)
            .map_err(unpack)
    }
}

/// In-memory, ordered list of events
pub struct EventCatalog {
    slots: Vec<Slot>,
    index: HashMap<EventId, usize>,
}

impl EventCatalog {
    /// Build a catalog from events, keeping their order
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::InvalidInput`] if two events share an id or an
    /// event has more tickets sold than it has capacity.
    pub fn new(events: Vec<Event>) -> Result<Self, PurchaseError> {
        let mut index = HashMap::with_capacity(events.len());
        for (position, event) in events.iter().enumerate() {
            if event.sold_tickets > event.max_tickets {
                return Err(PurchaseError::InvalidInput(format!(
                    "Event {} has {} tickets sold but only {} available",
                    event.id, event.sold_tickets, event.max_tickets
                )));
            }
            if index.insert(event.id, position).is_some() {
                return Err(PurchaseError::InvalidInput(format!(
                    "Duplicate event id {}",
                    event.id
                )));
            }
        }

        Ok(Self::from_events(events, index))
    }

    /// The three demo events the web front-end ships with
    #[must_use]
    pub fn demo() -> Self {
        let events = demo_events();
        let index = events
            .iter()
            .enumerate()
            .map(|(position, event)| (event.id, position))
            .collect();

        Self::from_events(events, index)
    }

    fn from_events(events: Vec<Event>, index: HashMap<EventId, usize>) -> Self {
        let slots = events
            .into_iter()
            .map(|event| Slot {
                counts: AtomicU64::new(pack(event.sold_tickets, 0)),
                event,
            })
            .collect();

        Self { slots, index }
    }

    /// Snapshots of every event in catalog order
    ///
    /// Lazy; call again for a fresh pass.
    pub fn list(&self) -> impl Iterator<Item = Event> + '_ {
        self.slots.iter().map(Slot::snapshot)
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the catalog has no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of one event
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::NotFound`] for an unknown id.
    pub fn get(&self, id: EventId) -> Result<Event, PurchaseError> {
        self.slot(id).map(Slot::snapshot)
    }

    /// Tickets neither sold nor held
    ///
    /// # Errors
    ///
    /// Returns [`PurchaseError::NotFound`] for an unknown id.
    pub fn available(&self, id: EventId) -> Result<u32, PurchaseError> {
        let slot = self.slot(id)?;
        let (sold, held) = unpack(slot.counts.load(Ordering::Acquire));
        Ok(slot.event.max_tickets.saturating_sub(sold).saturating_sub(held))
    }

    /// Sell one ticket directly, without a hold
    ///
    /// The capacity check counts outstanding holds. Nothing changes on failure.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::NotFound`]: unknown id
    /// - [`PurchaseError::SoldOut`]: no ticket available
    pub fn record_sale(&self, id: EventId) -> Result<Event, PurchaseError> {
        let slot = self.slot(id)?;
        let max = slot.event.max_tickets;

        slot.update(|sold, held| has_room(sold, held, max).then_some((sold + 1, held)))
            .map_err(|_| PurchaseError::SoldOut(id))?;

        crate::metrics::record_ticket_sold();
        tracing::debug!(event_id = %id, "Ticket sale recorded");
        Ok(slot.snapshot())
    }

    /// Reserve one ticket until the returned hold is committed or dropped
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::NotFound`]: unknown id
    /// - [`PurchaseError::SoldOut`]: no ticket available
    pub fn hold(self: &Arc<Self>, id: EventId) -> Result<SeatHold, PurchaseError> {
        let position = *self.index.get(&id).ok_or(PurchaseError::NotFound(id))?;
        let slot = &self.slots[position];
        let max = slot.event.max_tickets;

        slot.update(|sold, held| has_room(sold, held, max).then_some((sold, held + 1)))
            .map_err(|_| PurchaseError::SoldOut(id))?;

        tracing::debug!(event_id = %id, "Seat held");
        Ok(SeatHold {
            catalog: Arc::clone(self),
            position,
            event_id: id,
            price: slot.event.price,
            committed: false,
        })
    }

    fn slot(&self, id: EventId) -> Result<&Slot, PurchaseError> {
        self.index
            .get(&id)
            .map(|&position| &self.slots[position])
            .ok_or(PurchaseError::NotFound(id))
    }
}

impl std::fmt::Debug for EventCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}

/// One reserved ticket
///
/// Counts towards capacity until committed into a sale or dropped.
#[must_use = "dropping a SeatHold releases the seat"]
pub struct SeatHold {
    catalog: Arc<EventCatalog>,
    position: usize,
    event_id: EventId,
    price: Amount,
    committed: bool,
}

impl SeatHold {
    /// Event the seat belongs to
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Ticket price at the time of the hold
    #[must_use]
    pub const fn price(&self) -> Amount {
        self.price
    }

    /// Turn the hold into a sale
    ///
    /// Cannot fail: the seat was already counted against capacity.
    pub fn commit(mut self) -> Event {
        self.committed = true;
        let slot = &self.catalog.slots[self.position];
        // Always Ok: the closure never declines
        let _ = slot.update(|sold, held| Some((sold + 1, held.saturating_sub(1))));

        crate::metrics::record_ticket_sold();
        tracing::debug!(event_id = %self.event_id, "Seat hold committed");
        slot.snapshot()
    }
}

impl Drop for SeatHold {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let slot = &self.catalog.slots[self.position];
        let _ = slot.update(|sold, held| Some((sold, held.saturating_sub(1))));
        tracing::debug!(event_id = %self.event_id, "Seat hold released");
    }
}

impl std::fmt::Debug for SeatHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatHold")
            .field("event_id", &self.event_id)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
fn demo_event(
    id: u32,
    name: &str,
    description: &str,
    date: (i32, u32, u32),
    time: (u32, u32),
    location: &str,
    price_wei: u128,
    (max_tickets, sold_tickets): (u32, u32),
    image_url: &str,
    organizer: &str,
) -> Event {
    Event {
        id: EventId::new(id),
        name: name.to_string(),
        description: description.to_string(),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap_or_default(),
        time: NaiveTime::from_hms_opt(time.0, time.1, 0).unwrap_or_default(),
        location: location.to_string(),
        organizer: organizer.to_string(),
        image_url: image_url.to_string(),
        price: Amount::from_wei(price_wei),
        max_tickets,
        sold_tickets,
    }
}

const MILLI_ETH: u128 = 1_000_000_000_000_000;

fn demo_events() -> Vec<Event> {
    vec![
        demo_event(
            1,
            "Tech Conference 2025",
            "Annual technology conference featuring the latest innovations",
            (2025, 7, 15),
            (9, 0),
            "Convention Center, Chennai",
            50 * MILLI_ETH,
            (50, 12),
            "https://images.unsplash.com/photo-1540575467063-178a50c2df87?w=400&h=250&fit=crop",
            "Tech Community",
        ),
        demo_event(
            2,
            "Blockchain Summit",
            "Deep dive into blockchain technology and cryptocurrency",
            (2025, 8, 20),
            (10, 0),
            "Business Hub, Mumbai",
            80 * MILLI_ETH,
            (55, 23),
            "https://images.unsplash.com/photo-1559223607-b4d0555ae227?w=400&h=250&fit=crop",
            "Crypto India",
        ),
        demo_event(
            3,
            "AI Workshop",
            "Hands-on workshop on artificial intelligence and machine learning",
            (2025, 9, 10),
            (14, 0),
            "Tech Park, Bangalore",
            30 * MILLI_ETH,
            (30, 8),
            "https://images.unsplash.com/photo-1485827404703-89b55fcc595e?w=400&h=250&fit=crop",
            "AI Society",
        ),
    ]
}
