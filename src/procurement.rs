//! Procurement: purchase requisitions, purchase orders and goods receipts.
//!
//! Receipt posting is the reconciliation point: every accepted receipt line
//! credits the stock ledger, cumulative received quantities are checked
//! against the ordered quantity of the purchase-order line, and the order's
//! status is recomputed from the cumulative totals, all in one transaction.

use chrono::Utc;
use sled::Transactional;
use tracing::info;

use crate::config::ServiceConfig;
use crate::db;
use crate::error::{RecordKind, Result, StoreError};
use crate::ids;
use crate::master::MasterRegistry;
use crate::stock::{self, StockLedger};
use crate::types::{Day, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum PurchaseRequisitionStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Ordered,
}

impl core::fmt::Display for PurchaseRequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PurchaseRequisitionStatus::Draft => "DRAFT",
            PurchaseRequisitionStatus::Ordered => "ORDERED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum PurchaseOrderStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingApproval,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    PartiallyReceived,
    #[n(5)]
    FullyReceived,
    #[n(6)]
    Cancelled,
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::PendingApproval => "PENDING_APPROVAL",
            PurchaseOrderStatus::Approved => "APPROVED",
            PurchaseOrderStatus::Rejected => "REJECTED",
            PurchaseOrderStatus::PartiallyReceived => "PARTIALLY_RECEIVED",
            PurchaseOrderStatus::FullyReceived => "FULLY_RECEIVED",
            PurchaseOrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseRequisitionLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub item_id: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub purpose: Option<String>,
}

/// The bridge between an internal requisition and a vendor-facing order.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseRequisition {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub requisition_id: Option<String>,
    #[n(2)]
    pub department_id: Option<String>,
    #[n(3)]
    pub requested_by: String,
    #[n(4)]
    pub required_by_date: Option<Day>,
    #[n(5)]
    pub remarks: Option<String>,
    #[n(6)]
    pub status: PurchaseRequisitionStatus,
    #[n(7)]
    pub lines: Vec<PurchaseRequisitionLine>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

impl PurchaseRequisition {
    pub fn line(&self, line_id: &str) -> Option<&PurchaseRequisitionLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseOrderLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub item_id: String,
    #[n(2)]
    pub quantity: u64,
    /// Minor currency units per unit of measure.
    #[n(3)]
    pub unit_price: u64,
    #[n(4)]
    pub total_amount: u64,
    #[n(5)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PurchaseOrder {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub purchase_requisition_id: String,
    #[n(2)]
    pub vendor_id: String,
    #[n(3)]
    pub department_id: Option<String>,
    #[n(4)]
    pub created_by: String,
    #[n(5)]
    pub order_date: Day,
    #[n(6)]
    pub expected_delivery_date: Option<Day>,
    #[n(7)]
    pub remarks: Option<String>,
    #[n(8)]
    pub status: PurchaseOrderStatus,
    #[n(9)]
    pub lines: Vec<PurchaseOrderLine>,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
    #[n(11)]
    pub updated_at: TimeStamp<Utc>,
}

impl PurchaseOrder {
    pub fn line(&self, line_id: &str) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct GoodsReceiptLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub purchase_order_line_id: String,
    #[n(2)]
    pub item_id: String,
    /// Snapshot of the order line's quantity at receipt time.
    #[n(3)]
    pub ordered_quantity: u64,
    #[n(4)]
    pub received_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct GoodsReceipt {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub purchase_order_id: String,
    #[n(2)]
    pub vendor_id: String,
    #[n(3)]
    pub department_id: Option<String>,
    #[n(4)]
    pub received_by: String,
    #[n(5)]
    pub receipt_date: Day,
    #[n(6)]
    pub remarks: Option<String>,
    #[n(7)]
    pub lines: Vec<GoodsReceiptLine>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

pub struct PurchaseRequisitionDraft {
    pub requisition_id: Option<String>,
    pub department_id: Option<String>,
    pub requested_by: String,
    pub required_by_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<PurchaseRequisitionLineDraft>,
}

pub struct PurchaseRequisitionLineDraft {
    pub item_id: String,
    pub quantity: u64,
    pub purpose: Option<String>,
}

pub struct PurchaseOrderDraft {
    pub purchase_requisition_id: String,
    pub vendor_id: String,
    pub department_id: Option<String>,
    pub created_by: String,
    pub order_date: Option<Day>,
    pub expected_delivery_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<PurchaseOrderLineDraft>,
}

pub struct PurchaseOrderLineDraft {
    pub purchase_requisition_line_id: String,
    pub item_id: String,
    pub quantity: u64,
    pub unit_price: u64,
    pub remarks: Option<String>,
}

pub struct GoodsReceiptDraft {
    pub purchase_order_id: String,
    pub received_by: String,
    pub receipt_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<GoodsReceiptLineDraft>,
}

pub struct GoodsReceiptLineDraft {
    pub purchase_order_line_id: String,
    pub item_id: String,
    pub received_quantity: u64,
}

#[derive(Clone)]
pub struct ProcurementService {
    purchase_requisitions: sled::Tree,
    orders: sled::Tree,
    receipts: sled::Tree,
    received_totals: sled::Tree,
    requisitions: sled::Tree,
    ledger: StockLedger,
    registry: MasterRegistry,
    config: ServiceConfig,
}

impl ProcurementService {
    pub fn open(db: &sled::Db, registry: MasterRegistry, ledger: StockLedger) -> Result<Self> {
        Self::open_with(db, registry, ledger, ServiceConfig::default())
    }

    pub fn open_with(
        db: &sled::Db,
        registry: MasterRegistry,
        ledger: StockLedger,
        config: ServiceConfig,
    ) -> Result<Self> {
        Ok(Self {
            purchase_requisitions: db::open_tree(db, db::PURCHASE_REQUISITIONS)?,
            orders: db::open_tree(db, db::PURCHASE_ORDERS)?,
            receipts: db::open_tree(db, db::GOODS_RECEIPTS)?,
            received_totals: db::open_tree(db, db::RECEIVED_TOTALS)?,
            requisitions: db::open_tree(db, db::REQUISITIONS)?,
            ledger,
            registry,
            config,
        })
    }

    pub fn create_purchase_requisition(
        &self,
        draft: PurchaseRequisitionDraft,
    ) -> Result<PurchaseRequisition> {
        if draft.requested_by.trim().is_empty() {
            return Err(StoreError::validation("requested_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a purchase requisition needs at least one line",
            ));
        }

        // A PR either traces a department requisition (inheriting its
        // department) or names a department directly.
        let department_id = if let Some(requisition_id) = &draft.requisition_id {
            let requisition: crate::requisition::Requisition =
                db::load(&self.requisitions, RecordKind::Requisition, requisition_id)?;
            Some(requisition.department_id)
        } else if let Some(department_id) = &draft.department_id {
            self.registry.department(department_id)?;
            Some(department_id.clone())
        } else {
            None
        };

        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in draft.lines {
            if !self.registry.item_exists(&line.item_id)? {
                return Err(StoreError::not_found(RecordKind::Item, &line.item_id));
            }
            self.check_quantity(line.quantity, "ordered")?;
            lines.push(PurchaseRequisitionLine {
                id: ids::mint(ids::PURCHASE_REQUISITION_LINE)?,
                item_id: line.item_id,
                quantity: line.quantity,
                purpose: line.purpose,
            });
        }

        let now = TimeStamp::now();
        let pr = PurchaseRequisition {
            id: ids::mint(ids::PURCHASE_REQUISITION)?,
            requisition_id: draft.requisition_id,
            department_id,
            requested_by: draft.requested_by,
            required_by_date: draft.required_by_date,
            remarks: draft.remarks,
            status: PurchaseRequisitionStatus::Draft,
            lines,
            created_at: now,
            updated_at: now,
        };
        db::store(&self.purchase_requisitions, &pr.id, &pr)?;
        info!(id = %pr.id, lines = pr.lines.len(), "purchase requisition created");
        Ok(pr)
    }

    pub fn create_purchase_order(&self, draft: PurchaseOrderDraft) -> Result<PurchaseOrder> {
        if draft.created_by.trim().is_empty() {
            return Err(StoreError::validation("created_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a purchase order needs at least one line",
            ));
        }

        let mut pr: PurchaseRequisition = db::load(
            &self.purchase_requisitions,
            RecordKind::PurchaseRequisition,
            &draft.purchase_requisition_id,
        )?;
        self.registry.vendor(&draft.vendor_id)?;
        let department_id = match &draft.department_id {
            Some(department_id) => {
                self.registry.department(department_id)?;
                Some(department_id.clone())
            }
            None => pr.department_id.clone(),
        };

        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in draft.lines {
            let pr_line = pr
                .line(&line.purchase_requisition_line_id)
                .ok_or_else(|| StoreError::LineNotFound {
                    parent_id: pr.id.clone(),
                    line_id: line.purchase_requisition_line_id.clone(),
                })?;
            if !self.registry.item_exists(&line.item_id)? {
                return Err(StoreError::not_found(RecordKind::Item, &line.item_id));
            }
            if line.item_id != pr_line.item_id {
                return Err(StoreError::LineMismatch {
                    line_id: line.purchase_requisition_line_id.clone(),
                    detail: format!(
                        "declares item {} but the purchase-requisition line carries {}",
                        line.item_id, pr_line.item_id
                    ),
                });
            }
            self.check_quantity(line.quantity, "ordered")?;
            let total_amount = line
                .unit_price
                .checked_mul(line.quantity)
                .ok_or_else(|| StoreError::validation("line amount overflow"))?;
            lines.push(PurchaseOrderLine {
                id: ids::mint(ids::PURCHASE_ORDER_LINE)?,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_amount,
                remarks: line.remarks,
            });
        }

        let now = TimeStamp::now();
        let order = PurchaseOrder {
            id: ids::mint(ids::PURCHASE_ORDER)?,
            purchase_requisition_id: pr.id.clone(),
            vendor_id: draft.vendor_id,
            department_id,
            created_by: draft.created_by,
            order_date: draft.order_date.unwrap_or_else(Day::today),
            expected_delivery_date: draft.expected_delivery_date,
            remarks: draft.remarks,
            status: PurchaseOrderStatus::Draft,
            lines,
            created_at: now,
            updated_at: now,
        };

        pr.status = PurchaseRequisitionStatus::Ordered;
        pr.updated_at = now;

        let encoded_order = db::encode(&order)?;
        let encoded_pr = db::encode(&pr)?;
        (&self.orders, &self.purchase_requisitions)
            .transaction(|(orders, purchase_requisitions)| {
                orders.insert(order.id.as_str(), encoded_order.clone())?;
                purchase_requisitions.insert(pr.id.as_str(), encoded_pr.clone())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        info!(id = %order.id, vendor = %order.vendor_id, lines = order.lines.len(), "purchase order created");
        Ok(order)
    }

    /// Post a goods receipt against a purchase order.
    ///
    /// Cumulative accounting: for every order line the sum of received
    /// quantities across all receipts may never exceed the ordered quantity,
    /// and the order is FULLY_RECEIVED exactly when every line is
    /// cumulatively received in full. Ledger credits, cumulative totals, the
    /// receipt record and the order's status commit atomically.
    pub fn create_goods_receipt(&self, draft: GoodsReceiptDraft) -> Result<GoodsReceipt> {
        if draft.received_by.trim().is_empty() {
            return Err(StoreError::validation("received_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a goods receipt needs at least one line",
            ));
        }

        let order: PurchaseOrder = db::load(
            &self.orders,
            RecordKind::PurchaseOrder,
            &draft.purchase_order_id,
        )?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let order_line =
                order
                    .line(&line.purchase_order_line_id)
                    .ok_or_else(|| StoreError::LineMismatch {
                        line_id: line.purchase_order_line_id.clone(),
                        detail: format!("line does not belong to purchase order {}", order.id),
                    })?;
            if !self.registry.item_exists(&line.item_id)? {
                return Err(StoreError::not_found(RecordKind::Item, &line.item_id));
            }
            if line.item_id != order_line.item_id {
                return Err(StoreError::LineMismatch {
                    line_id: line.purchase_order_line_id.clone(),
                    detail: format!(
                        "declares item {} but the order line carries {}",
                        line.item_id, order_line.item_id
                    ),
                });
            }
            if line.received_quantity > self.config.max_line_quantity {
                return Err(StoreError::validation(format!(
                    "received quantity {} exceeds the configured maximum {}",
                    line.received_quantity, self.config.max_line_quantity
                )));
            }
            lines.push(GoodsReceiptLine {
                id: ids::mint(ids::GOODS_RECEIPT_LINE)?,
                purchase_order_line_id: line.purchase_order_line_id.clone(),
                item_id: line.item_id.clone(),
                ordered_quantity: order_line.quantity,
                received_quantity: line.received_quantity,
            });
        }

        let receipt = GoodsReceipt {
            id: ids::mint(ids::GOODS_RECEIPT)?,
            purchase_order_id: order.id.clone(),
            vendor_id: order.vendor_id.clone(),
            department_id: order.department_id.clone(),
            received_by: draft.received_by,
            receipt_date: draft.receipt_date.unwrap_or_else(Day::today),
            remarks: draft.remarks,
            lines,
            created_at: TimeStamp::now(),
        };
        let encoded_receipt = db::encode(&receipt)?;
        let now = receipt.created_at;

        let status = (
            &self.receipts,
            &self.received_totals,
            self.ledger.tree(),
            &self.orders,
        )
            .transaction(|(receipts, totals, stock_tree, orders)| {
                for line in &receipt.lines {
                    let already = db::tx_read_total(totals, &line.purchase_order_line_id)?;
                    let cumulative = already
                        .checked_add(line.received_quantity)
                        .ok_or_else(|| {
                            StoreError::validation("received quantity overflow").abort()
                        })?;
                    if cumulative > line.ordered_quantity {
                        return Err(StoreError::OverReceipt {
                            purchase_order_line_id: line.purchase_order_line_id.clone(),
                            ordered: line.ordered_quantity,
                            already_received: already,
                            attempted: line.received_quantity,
                        }
                        .abort());
                    }
                    db::tx_write_total(totals, &line.purchase_order_line_id, cumulative)?;
                    if line.received_quantity > 0 {
                        stock::tx_credit(stock_tree, &line.item_id, line.received_quantity)?;
                    }
                }

                // Recompute order status from the cumulative totals, which
                // include this receipt's own writes.
                let mut all_received = true;
                for order_line in &order.lines {
                    let received = db::tx_read_total(totals, &order_line.id)?;
                    if received < order_line.quantity {
                        all_received = false;
                    }
                }
                let status = if all_received {
                    PurchaseOrderStatus::FullyReceived
                } else {
                    PurchaseOrderStatus::PartiallyReceived
                };

                let mut updated_order = order.clone();
                updated_order.status = status;
                updated_order.updated_at = now;
                orders.insert(updated_order.id.as_str(), db::tx_encode(&updated_order)?)?;
                receipts.insert(receipt.id.as_str(), encoded_receipt.clone())?;
                Ok(status)
            })
            .map_err(StoreError::from)?;

        info!(
            id = %receipt.id,
            order = %receipt.purchase_order_id,
            order_status = %status,
            lines = receipt.lines.len(),
            "goods receipt posted"
        );
        Ok(receipt)
    }

    pub fn purchase_requisition(&self, id: &str) -> Result<PurchaseRequisition> {
        db::load(
            &self.purchase_requisitions,
            RecordKind::PurchaseRequisition,
            id,
        )
    }

    pub fn purchase_order(&self, id: &str) -> Result<PurchaseOrder> {
        db::load(&self.orders, RecordKind::PurchaseOrder, id)
    }

    pub fn goods_receipt(&self, id: &str) -> Result<GoodsReceipt> {
        db::load(&self.receipts, RecordKind::GoodsReceipt, id)
    }

    pub fn list_purchase_requisitions(&self) -> Result<Vec<PurchaseRequisition>> {
        db::scan(&self.purchase_requisitions)
    }

    pub fn list_purchase_orders(&self) -> Result<Vec<PurchaseOrder>> {
        db::scan(&self.orders)
    }

    pub fn list_goods_receipts(&self) -> Result<Vec<GoodsReceipt>> {
        db::scan(&self.receipts)
    }

    /// Cumulative received quantity for an order line across all receipts.
    pub fn received_total(&self, purchase_order_line_id: &str) -> Result<u64> {
        db::read_total(&self.received_totals, purchase_order_line_id)
    }

    fn check_quantity(&self, quantity: u64, label: &str) -> Result<()> {
        if quantity == 0 {
            return Err(StoreError::validation(format!(
                "{label} quantity must be greater than 0"
            )));
        }
        if quantity > self.config.max_line_quantity {
            return Err(StoreError::validation(format!(
                "{label} quantity {quantity} exceeds the configured maximum {}",
                self.config.max_line_quantity
            )));
        }
        Ok(())
    }
}
