//! Property-based tests for catalog capacity accounting.
//!
//! ## Properties Verified
//!
//! - `0 <= sold <= max` after any sequence of holds, commits, releases and
//!   direct sales
//! - `sold + held <= max` at every step
//! - A sale or hold at capacity fails `SoldOut` and changes nothing

#![allow(clippy::unwrap_used)]

use chainpass_ticketing::{Event, EventCatalog, EventId, PurchaseError, SeatHold};
use proptest::prelude::*;
use std::sync::Arc;

const EVENT: EventId = EventId::new(1);

#[derive(Clone, Debug)]
enum Op {
    Hold,
    Commit(usize),
    Release(usize),
    Sale,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Hold),
        2 => any::<usize>().prop_map(Op::Commit),
        2 => any::<usize>().prop_map(Op::Release),
        2 => Just(Op::Sale),
    ]
}

/// Capacity and an initial sold count within it
fn arb_counts() -> impl Strategy<Value = (u32, u32)> {
    (0u32..12).prop_flat_map(|max| (Just(max), 0..=max))
}

fn catalog(max_tickets: u32, sold_tickets: u32) -> Arc<EventCatalog> {
    let event = Event {
        id: EVENT,
        max_tickets,
        sold_tickets,
        ..EventCatalog::demo().get(EventId::new(1)).unwrap()
    };
    Arc::new(EventCatalog::new(vec![event]).unwrap())
}

proptest! {
    /// Property: capacity holds across arbitrary operation sequences
    #[test]
    fn prop_sold_never_exceeds_capacity(
        (max, sold) in arb_counts(),
        ops in prop::collection::vec(arb_op(), 0..60)
    ) {
        let catalog = catalog(max, sold);
        let mut holds: Vec<SeatHold> = Vec::new();
        let mut expected_sold = sold;

        for op in ops {
            let before = catalog.get(EVENT).unwrap().sold_tickets;
            let available = catalog.available(EVENT).unwrap();

            match op {
                Op::Hold => match catalog.hold(EVENT) {
                    Ok(hold) => holds.push(hold),
                    Err(error) => {
                        prop_assert_eq!(available, 0);
                        prop_assert_eq!(error, PurchaseError::SoldOut(EVENT));
                        prop_assert_eq!(catalog.available(EVENT).unwrap(), 0);
                    },
                },
                Op::Commit(i) if !holds.is_empty() => {
                    let hold = holds.swap_remove(i % holds.len());
                    let event = hold.commit();
                    expected_sold += 1;
                    prop_assert_eq!(event.sold_tickets, expected_sold);
                },
                Op::Release(i) if !holds.is_empty() => {
                    drop(holds.swap_remove(i % holds.len()));
                },
                Op::Commit(_) | Op::Release(_) => {},
                Op::Sale => match catalog.record_sale(EVENT) {
                    Ok(event) => {
                        expected_sold += 1;
                        prop_assert_eq!(event.sold_tickets, expected_sold);
                    },
                    Err(error) => {
                        prop_assert_eq!(available, 0);
                        prop_assert_eq!(error, PurchaseError::SoldOut(EVENT));
                        prop_assert_eq!(catalog.get(EVENT).unwrap().sold_tickets, before);
                    },
                },
            }

            let event = catalog.get(EVENT).unwrap();
            let held = u32::try_from(holds.len()).unwrap();
            prop_assert!(event.sold_tickets <= event.max_tickets);
            prop_assert_eq!(event.sold_tickets, expected_sold);
            prop_assert_eq!(
                catalog.available(EVENT).unwrap(),
                event.max_tickets - event.sold_tickets - held
            );
        }

        drop(holds);
        prop_assert_eq!(
            catalog.available(EVENT).unwrap(),
            max - expected_sold
        );
    }

    /// Property: a sale at capacity fails and leaves the event untouched
    #[test]
    fn prop_sale_at_capacity_is_rejected(max in 0u32..20) {
        let catalog = catalog(max, max);
        let before = catalog.get(EVENT).unwrap();

        prop_assert_eq!(catalog.record_sale(EVENT), Err(PurchaseError::SoldOut(EVENT)));
        prop_assert!(catalog.hold(EVENT).is_err());
        prop_assert_eq!(catalog.get(EVENT).unwrap(), before);
    }
}
