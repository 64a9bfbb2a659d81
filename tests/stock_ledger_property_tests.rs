//! Ledger invariants: non-negativity under arbitrary operation sequences and
//! under concurrent movers of the same item.

use plant_store::stock::StockLedger;
use plant_store::StoreError;
use proptest::prelude::*;

fn ledger() -> (tempfile::TempDir, StockLedger) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("stock.db")).unwrap();
    (dir, StockLedger::open(&db).unwrap())
}

#[derive(Debug, Clone)]
enum Op {
    Credit(u64),
    Debit(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..=1_000).prop_map(Op::Credit),
        (1u64..=1_000).prop_map(Op::Debit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Whatever sequence of moves is applied, the ledger agrees with a plain
    // counter model and a rejected debit changes nothing.
    #[test]
    fn available_quantity_tracks_the_model_and_stays_non_negative(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        let (_dir, ledger) = ledger();
        let mut model: u64 = 0;

        for op in ops {
            match op {
                Op::Credit(qty) => {
                    model += qty;
                    let record = ledger.increment("item_x", qty).unwrap();
                    prop_assert_eq!(record.available, model);
                }
                Op::Debit(qty) => {
                    if qty <= model {
                        model -= qty;
                        let record = ledger.decrement("item_x", qty).unwrap();
                        prop_assert_eq!(record.available, model);
                    } else {
                        let err = ledger.decrement("item_x", qty).unwrap_err();
                        prop_assert!(
                            matches!(err, StoreError::InsufficientStock { .. }),
                            "expected InsufficientStock, got {:?}",
                            err
                        );
                    }
                }
            }
            prop_assert_eq!(ledger.get("item_x").unwrap().available, model);
        }
    }

    // Movers of different items never interfere.
    #[test]
    fn items_are_independent(
        a in 1u64..=1_000,
        b in 1u64..=1_000,
    ) {
        let (_dir, ledger) = ledger();
        ledger.increment("item_a", a).unwrap();
        ledger.increment("item_b", b).unwrap();
        ledger.decrement("item_a", a).unwrap();

        prop_assert_eq!(ledger.get("item_a").unwrap().available, 0);
        prop_assert_eq!(ledger.get("item_b").unwrap().available, b);
    }
}

// Two unordered decrements of 5 and 7 against an available 10: exactly one
// commits. The loser sees InsufficientStock and the balance lands on 3 or 5,
// never below zero.
#[test]
fn concurrent_decrements_never_overdraw() {
    for _ in 0..50 {
        let (_dir, ledger) = ledger();
        ledger.increment("item_x", 10).unwrap();

        let results: Vec<_> = [5u64, 7]
            .into_iter()
            .map(|qty| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.decrement("item_x", qty))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(succeeded, 1, "exactly one decrement must commit");
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, StoreError::InsufficientStock { .. }));
            }
        }

        let available = ledger.get("item_x").unwrap().available;
        assert!(available == 3 || available == 5);
    }
}
