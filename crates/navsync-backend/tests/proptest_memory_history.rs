//! Property-based invariants for [`MemoryHistory`].
//!
//! 1. The cursor always points inside a non-empty log.
//! 2. The log never exceeds `max_entries`.
//! 3. `push` always leaves the pushed entry current with no forward entries.
//! 4. Listener deliveries match the stats counters.

use std::cell::Cell;
use std::rc::Rc;

use navsync_backend::{Entry, MemoryHistory, MemoryHistoryConfig, NavigationBackend, listener};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Replace(u8),
    Go(i8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..20).prop_map(Op::Push),
        (0u8..20).prop_map(Op::Replace),
        (-4i8..4).prop_map(Op::Go),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn cursor_and_limit_invariants(
        max_entries in 1usize..8,
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let history = MemoryHistory::with_entries(
            vec![Entry::new("/start")],
            0,
            MemoryHistoryConfig { max_entries },
        );
        let deliveries = Rc::new(Cell::new(0u64));
        let deliveries_clone = Rc::clone(&deliveries);
        history.subscribe(listener(move |_, _| {
            deliveries_clone.set(deliveries_clone.get() + 1);
            Ok(())
        }));

        for op in &ops {
            match op {
                Op::Push(n) => {
                    history.push(Entry::new(format!("/p{n}"))).unwrap();
                    prop_assert_eq!(history.current_entry().path, format!("/p{n}"));
                    prop_assert!(!history.can_go_forward());
                }
                Op::Replace(n) => {
                    let before = history.entry_count();
                    history.replace(Entry::new(format!("/r{n}"))).unwrap();
                    prop_assert_eq!(history.entry_count(), before);
                }
                Op::Go(delta) => history.go(isize::from(*delta)).unwrap(),
            }
            prop_assert!(history.entry_count() >= 1);
            prop_assert!(history.entry_count() <= max_entries);
            prop_assert!(history.index() < history.entry_count());
        }

        let stats = history.stats();
        prop_assert_eq!(deliveries.get(), stats.pushes + stats.replaces + stats.pops);
    }
}
