//! Tree layout and CBOR codec helpers shared by the services.
//!
//! One sled tree per record family, records keyed by their prefixed id and
//! encoded with minicbor. The `*_totals` trees are cumulative-quantity
//! indexes (big-endian u64 counters) maintained in the same transaction as
//! the document that moves them, so reconciliation checks are a single
//! transactional read instead of a scan.

use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};

use crate::error::{RecordKind, Result, StoreError};

pub(crate) const ITEMS: &str = "items";
pub(crate) const ITEM_CODES: &str = "item_codes";
pub(crate) const DEPARTMENTS: &str = "departments";
pub(crate) const DEPARTMENT_CODES: &str = "department_codes";
pub(crate) const VENDORS: &str = "vendors";
pub(crate) const VENDOR_CODES: &str = "vendor_codes";
pub(crate) const REQUISITIONS: &str = "requisitions";
pub(crate) const PURCHASE_REQUISITIONS: &str = "purchase_requisitions";
pub(crate) const PURCHASE_ORDERS: &str = "purchase_orders";
pub(crate) const GOODS_RECEIPTS: &str = "goods_receipts";
pub(crate) const STORE_ISSUES: &str = "store_issues";
pub(crate) const STORE_RETURNS: &str = "store_returns";
pub(crate) const STOCK: &str = "stock";
pub(crate) const ISSUED_TOTALS: &str = "issued_totals";
pub(crate) const RECEIVED_TOTALS: &str = "received_totals";
pub(crate) const RETURNED_TOTALS: &str = "returned_totals";

pub(crate) fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    Ok(db.open_tree(name)?)
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(value).map_err(StoreError::codec)
}

pub(crate) fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    minicbor::decode(bytes).map_err(StoreError::codec)
}

/// Fetch a record by id, `None` when absent.
pub(crate) fn fetch<T: for<'b> minicbor::Decode<'b, ()>>(
    tree: &sled::Tree,
    id: &str,
) -> Result<Option<T>> {
    match tree.get(id)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Fetch a record by id, failing with `NotFound` when absent.
pub(crate) fn load<T: for<'b> minicbor::Decode<'b, ()>>(
    tree: &sled::Tree,
    kind: RecordKind,
    id: &str,
) -> Result<T> {
    fetch(tree, id)?.ok_or_else(|| StoreError::not_found(kind, id))
}

pub(crate) fn store<T: minicbor::Encode<()>>(tree: &sled::Tree, id: &str, value: &T) -> Result<()> {
    tree.insert(id, encode(value)?)?;
    Ok(())
}

/// Decode every record in a tree, in key order.
pub(crate) fn scan<T: for<'b> minicbor::Decode<'b, ()>>(tree: &sled::Tree) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for entry in tree.iter() {
        let (_, bytes) = entry?;
        records.push(decode(&bytes)?);
    }
    Ok(records)
}

/// Read a cumulative-quantity counter inside a transaction (0 when unset).
pub(crate) fn tx_read_total(
    tree: &sled::transaction::TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<u64, StoreError> {
    match tree.get(key)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                StoreError::Codec(format!("malformed quantity counter for {key}")).abort()
            })?;
            Ok(u64::from_be_bytes(raw))
        }
        None => Ok(0),
    }
}

/// Overwrite a cumulative-quantity counter inside a transaction.
pub(crate) fn tx_write_total(
    tree: &sled::transaction::TransactionalTree,
    key: &str,
    total: u64,
) -> ConflictableTransactionResult<(), StoreError> {
    tree.insert(key, total.to_be_bytes().to_vec())?;
    Ok(())
}

/// Encode a record inside a transaction, mapping codec failures to aborts.
pub(crate) fn tx_encode<T: minicbor::Encode<()>>(
    value: &T,
) -> std::result::Result<Vec<u8>, ConflictableTransactionError<StoreError>> {
    encode(value).map_err(StoreError::abort)
}

/// Read a cumulative-quantity counter outside a transaction (0 when unset).
pub(crate) fn read_total(tree: &sled::Tree, key: &str) -> Result<u64> {
    match tree.get(key)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Codec(format!("malformed quantity counter for {key}")))?;
            Ok(u64::from_be_bytes(raw))
        }
        None => Ok(0),
    }
}
