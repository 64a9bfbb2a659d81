//! The stock ledger: one authoritative available-quantity record per item.
//!
//! All mutation goes through atomic check-and-apply: standalone calls use a
//! compare-and-swap loop on the stock tree, and the receipt/issue/return
//! engines use the transactional credit/debit helpers so their stock moves
//! commit or abort together with the document that caused them. Available
//! quantity can never go negative; a debit that would breach this fails and
//! leaves the record untouched.

use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

use crate::db;
use crate::error::{Result, StoreError};

/// Per-item stock counters. `reserved` is part of the persisted shape but
/// not yet consulted by any business rule.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StockRecord {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub available: u64,
    #[n(2)]
    pub reserved: u64,
}

impl StockRecord {
    pub fn zero(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            available: 0,
            reserved: 0,
        }
    }
}

enum Delta {
    Credit(u64),
    Debit(u64),
}

#[derive(Clone)]
pub struct StockLedger {
    tree: sled::Tree,
}

impl StockLedger {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db::open_tree(db, db::STOCK)?,
        })
    }

    /// Current record for an item; zero-valued (and unpersisted) when the
    /// item has never moved.
    pub fn get(&self, item_id: &str) -> Result<StockRecord> {
        Ok(db::fetch(&self.tree, item_id)?.unwrap_or_else(|| StockRecord::zero(item_id)))
    }

    /// Add stock. `qty` must be > 0.
    pub fn increment(&self, item_id: &str, qty: u64) -> Result<StockRecord> {
        self.apply(item_id, Delta::Credit(qty))
    }

    /// Remove stock. `qty` must be > 0; fails with `InsufficientStock` when
    /// fewer than `qty` units are available, without touching the record.
    pub fn decrement(&self, item_id: &str, qty: u64) -> Result<StockRecord> {
        self.apply(item_id, Delta::Debit(qty))
    }

    /// Every record that has ever moved, in item-id order.
    pub fn list(&self) -> Result<Vec<StockRecord>> {
        db::scan(&self.tree)
    }

    fn apply(&self, item_id: &str, delta: Delta) -> Result<StockRecord> {
        let qty = match delta {
            Delta::Credit(qty) | Delta::Debit(qty) => qty,
        };
        if qty == 0 {
            return Err(StoreError::validation("quantity must be greater than 0"));
        }

        // Optimistic per-item CAS: concurrent movers of the same item retry,
        // movers of different items never contend.
        loop {
            let current = self.tree.get(item_id)?;
            let mut record = match &current {
                Some(bytes) => db::decode::<StockRecord>(bytes)?,
                None => StockRecord::zero(item_id),
            };

            record.available = match delta {
                Delta::Credit(qty) => record
                    .available
                    .checked_add(qty)
                    .ok_or_else(|| StoreError::validation("available quantity overflow"))?,
                Delta::Debit(qty) => {
                    if record.available < qty {
                        return Err(StoreError::InsufficientStock {
                            item_id: item_id.to_string(),
                            available: record.available,
                            requested: qty,
                        });
                    }
                    record.available - qty
                }
            };

            let encoded = db::encode(&record)?;
            let swapped =
                self.tree
                    .compare_and_swap(item_id, current.as_ref(), Some(encoded))?;
            if swapped.is_ok() {
                return Ok(record);
            }
        }
    }

    /// The underlying tree, for enrolment in multi-tree transactions.
    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }
}

/// Credit stock inside a transaction. A zero quantity is a no-op.
pub(crate) fn tx_credit(
    stock: &TransactionalTree,
    item_id: &str,
    qty: u64,
) -> ConflictableTransactionResult<u64, StoreError> {
    let mut record = tx_record(stock, item_id)?;
    record.available = record
        .available
        .checked_add(qty)
        .ok_or_else(|| StoreError::validation("available quantity overflow").abort())?;
    stock.insert(item_id, db::tx_encode(&record)?)?;
    Ok(record.available)
}

/// Debit stock inside a transaction, aborting with `InsufficientStock` when
/// the item cannot cover `qty`.
pub(crate) fn tx_debit(
    stock: &TransactionalTree,
    item_id: &str,
    qty: u64,
) -> ConflictableTransactionResult<u64, StoreError> {
    let mut record = tx_record(stock, item_id)?;
    if record.available < qty {
        return Err(StoreError::InsufficientStock {
            item_id: item_id.to_string(),
            available: record.available,
            requested: qty,
        }
        .abort());
    }
    record.available -= qty;
    stock.insert(item_id, db::tx_encode(&record)?)?;
    Ok(record.available)
}

fn tx_record(
    stock: &TransactionalTree,
    item_id: &str,
) -> ConflictableTransactionResult<StockRecord, StoreError> {
    match stock.get(item_id)? {
        Some(bytes) => db::decode::<StockRecord>(&bytes).map_err(StoreError::abort),
        None => Ok(StockRecord::zero(item_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (tempfile::TempDir, StockLedger) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("stock.db")).unwrap();
        (dir, StockLedger::open(&db).unwrap())
    }

    #[test]
    fn unseen_item_reads_as_zero() {
        let (_dir, ledger) = ledger();
        let record = ledger.get("item_missing").unwrap();
        assert_eq!(record.available, 0);
        assert_eq!(record.reserved, 0);
        // A read must not persist the zero record.
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn increment_then_decrement() {
        let (_dir, ledger) = ledger();
        ledger.increment("item_a", 10).unwrap();
        let record = ledger.decrement("item_a", 4).unwrap();
        assert_eq!(record.available, 6);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let (_dir, ledger) = ledger();
        assert!(matches!(
            ledger.increment("item_a", 0),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            ledger.decrement("item_a", 0),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn overdraw_fails_and_leaves_record_untouched() {
        let (_dir, ledger) = ledger();
        ledger.increment("item_a", 5).unwrap();

        let err = ledger.decrement("item_a", 6).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                available: 5,
                requested: 6,
                ..
            }
        ));
        assert_eq!(ledger.get("item_a").unwrap().available, 5);
    }
}
