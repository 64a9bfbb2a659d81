//! Error taxonomy for the plant store core.
//!
//! Every failure a caller can act on is a distinct [`StoreError`] variant
//! carrying the ids and quantities needed to correct the request and retry.
//! Storage and codec failures are folded in at the bottom.

use sled::transaction::{ConflictableTransactionError, TransactionError};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Record families that can be looked up by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Item,
    Department,
    Vendor,
    Requisition,
    PurchaseRequisition,
    PurchaseOrder,
    GoodsReceipt,
    StoreIssue,
    StoreReturn,
}

impl core::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            RecordKind::Item => "item",
            RecordKind::Department => "department",
            RecordKind::Vendor => "vendor",
            RecordKind::Requisition => "requisition",
            RecordKind::PurchaseRequisition => "purchase requisition",
            RecordKind::PurchaseOrder => "purchase order",
            RecordKind::GoodsReceipt => "goods receipt",
            RecordKind::StoreIssue => "store issue",
            RecordKind::StoreReturn => "store return",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state transition: {action} not allowed from {from}")]
    InvalidStateTransition { from: String, action: String },

    #[error("line {line_id} not found on {parent_id}")]
    LineNotFound { parent_id: String, line_id: String },

    #[error("line mismatch for {line_id}: {detail}")]
    LineMismatch { line_id: String, detail: String },

    #[error(
        "over-issue on requisition line {requisition_line_id}: remaining {remaining}, attempted {attempted}"
    )]
    OverIssue {
        requisition_line_id: String,
        remaining: u64,
        attempted: u64,
    },

    #[error(
        "over-receipt on order line {purchase_order_line_id}: ordered {ordered}, already received {already_received}, attempted {attempted}"
    )]
    OverReceipt {
        purchase_order_line_id: String,
        ordered: u64,
        already_received: u64,
        attempted: u64,
    },

    #[error(
        "over-return on issue line {store_issue_line_id}: issued {issued}, already returned {already_returned}, attempted {attempted}"
    )]
    OverReturn {
        store_issue_line_id: String,
        issued: u64,
        already_returned: u64,
        attempted: u64,
    },

    #[error("requisition line {requisition_line_id} is already fully issued")]
    AlreadyFulfilled { requisition_line_id: String },

    #[error("at least one line must have issued quantity > 0")]
    EmptyIssue,

    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: u64,
        requested: u64,
    },

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("configuration failure: {0}")]
    Config(String),
}

impl StoreError {
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        StoreError::Validation(reason.into())
    }

    pub(crate) fn codec(err: impl core::fmt::Display) -> Self {
        StoreError::Codec(err.to_string())
    }

    /// Wrap into the abort arm of a sled transaction.
    pub(crate) fn abort(self) -> ConflictableTransactionError<StoreError> {
        ConflictableTransactionError::Abort(self)
    }
}

// Lets services use `?` directly on the result of a sled transaction.
impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => StoreError::Storage(inner),
        }
    }
}
