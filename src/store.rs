//! Store floor operations: issuing stock against approved requisitions,
//! taking returns back in, and answering availability queries.
//!
//! An issue is the only path that debits the ledger and a return the only
//! path besides goods receipt that credits it. Both post their document,
//! their cumulative per-line totals and the stock moves in one transaction,
//! so a failing line aborts the whole document.

use chrono::Utc;
use sled::Transactional;
use tracing::info;

use crate::config::ServiceConfig;
use crate::db;
use crate::error::{RecordKind, Result, StoreError};
use crate::ids;
use crate::master::MasterRegistry;
use crate::requisition::{Requisition, RequisitionStatus};
use crate::stock::{self, StockLedger, StockRecord};
use crate::types::{Day, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum StoreIssueStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PartiallyIssued,
    #[n(2)]
    Issued,
    #[n(3)]
    Cancelled,
}

impl core::fmt::Display for StoreIssueStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            StoreIssueStatus::Draft => "DRAFT",
            StoreIssueStatus::PartiallyIssued => "PARTIALLY_ISSUED",
            StoreIssueStatus::Issued => "ISSUED",
            StoreIssueStatus::Cancelled => "CANCELLED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StoreIssueLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub requisition_line_id: String,
    #[n(2)]
    pub item_id: String,
    /// Snapshot of the requisition line's quantity at issue time.
    #[n(3)]
    pub requested_quantity: u64,
    #[n(4)]
    pub issued_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StoreIssue {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub requisition_id: String,
    #[n(2)]
    pub department_id: String,
    #[n(3)]
    pub issued_by: String,
    #[n(4)]
    pub issue_date: Day,
    #[n(5)]
    pub remarks: Option<String>,
    #[n(6)]
    pub status: StoreIssueStatus,
    #[n(7)]
    pub lines: Vec<StoreIssueLine>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl StoreIssue {
    pub fn line(&self, line_id: &str) -> Option<&StoreIssueLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StoreReturnLine {
    #[n(0)]
    pub id: String,
    /// Set when the return traces back to a specific issue line.
    #[n(1)]
    pub store_issue_line_id: Option<String>,
    #[n(2)]
    pub item_id: String,
    #[n(3)]
    pub quantity: u64,
    #[n(4)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StoreReturn {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub store_issue_id: Option<String>,
    #[n(2)]
    pub department_id: String,
    #[n(3)]
    pub returned_by: String,
    #[n(4)]
    pub return_date: Day,
    #[n(5)]
    pub remarks: Option<String>,
    #[n(6)]
    pub lines: Vec<StoreReturnLine>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

pub struct StoreIssueDraft {
    pub requisition_id: String,
    pub issued_by: String,
    pub issue_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<StoreIssueLineDraft>,
}

pub struct StoreIssueLineDraft {
    pub requisition_line_id: String,
    pub issued_quantity: u64,
}

pub struct StoreReturnDraft {
    pub store_issue_id: Option<String>,
    pub department_id: String,
    pub returned_by: String,
    pub return_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<StoreReturnLineDraft>,
}

pub struct StoreReturnLineDraft {
    pub store_issue_line_id: Option<String>,
    pub item_id: String,
    pub quantity: u64,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct StoreService {
    issues: sled::Tree,
    returns: sled::Tree,
    issued_totals: sled::Tree,
    returned_totals: sled::Tree,
    requisitions: sled::Tree,
    ledger: StockLedger,
    registry: MasterRegistry,
    config: ServiceConfig,
}

impl StoreService {
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
            issues: db::open_tree(db, db::STORE_ISSUES)?,
            returns: db::open_tree(db, db::STORE_RETURNS)?,
            issued_totals: db::open_tree(db, db::ISSUED_TOTALS)?,
            returned_totals: db::open_tree(db, db::RETURNED_TOTALS)?,
            requisitions: db::open_tree(db, db::REQUISITIONS)?,
            ledger,
            registry,
            config,
        })
    }

    /// Issue stock against an approved requisition.
    ///
    /// Every line is checked against what the requisition line still has
    /// outstanding (cumulatively, across earlier issues) and against the
    /// ledger. One bad line aborts the whole issue; nothing is debited and
    /// no document is written.
    pub fn create_issue(&self, draft: StoreIssueDraft) -> Result<StoreIssue> {
        if draft.issued_by.trim().is_empty() {
            return Err(StoreError::validation("issued_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a store issue needs at least one line",
            ));
        }

        let requisition: Requisition =
            db::load(&self.requisitions, RecordKind::Requisition, &draft.requisition_id)?;
        if requisition.status != RequisitionStatus::Approved {
            return Err(StoreError::InvalidStateTransition {
                from: requisition.status.to_string(),
                action: "STORE_ISSUE".to_string(),
            });
        }
        self.registry.department(&requisition.department_id)?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let req_line =
                requisition
                    .line(&line.requisition_line_id)
                    .ok_or_else(|| StoreError::LineNotFound {
                        parent_id: requisition.id.clone(),
                        line_id: line.requisition_line_id.clone(),
                    })?;
            if line.issued_quantity > self.config.max_line_quantity {
                return Err(StoreError::validation(format!(
                    "issued quantity {} exceeds the configured maximum {}",
                    line.issued_quantity, self.config.max_line_quantity
                )));
            }
            lines.push(StoreIssueLine {
                id: ids::mint(ids::STORE_ISSUE_LINE)?,
                requisition_line_id: line.requisition_line_id.clone(),
                item_id: req_line.item_id.clone(),
                requested_quantity: req_line.quantity,
                issued_quantity: line.issued_quantity,
            });
        }

        let mut issue = StoreIssue {
            id: ids::mint(ids::STORE_ISSUE)?,
            requisition_id: requisition.id.clone(),
            department_id: requisition.department_id.clone(),
            issued_by: draft.issued_by,
            issue_date: draft.issue_date.unwrap_or_else(Day::today),
            remarks: draft.remarks,
            status: StoreIssueStatus::Draft,
            lines,
            created_at: TimeStamp::now(),
        };

        let status = (&self.issues, &self.issued_totals, self.ledger.tree())
            .transaction(|(issues, totals, stock_tree)| {
                let mut any_issued = false;
                let mut all_fulfilled = true;
                for line in &issue.lines {
                    let already = db::tx_read_total(totals, &line.requisition_line_id)?;
                    let remaining = line.requested_quantity.saturating_sub(already);
                    if remaining == 0 {
                        return Err(StoreError::AlreadyFulfilled {
                            requisition_line_id: line.requisition_line_id.clone(),
                        }
                        .abort());
                    }
                    if line.issued_quantity > remaining {
                        return Err(StoreError::OverIssue {
                            requisition_line_id: line.requisition_line_id.clone(),
                            remaining,
                            attempted: line.issued_quantity,
                        }
                        .abort());
                    }
                    if line.issued_quantity > 0 {
                        stock::tx_debit(stock_tree, &line.item_id, line.issued_quantity)?;
                        db::tx_write_total(
                            totals,
                            &line.requisition_line_id,
                            already + line.issued_quantity,
                        )?;
                        any_issued = true;
                    }
                    if already + line.issued_quantity < line.requested_quantity {
                        all_fulfilled = false;
                    }
                }
                if !any_issued {
                    return Err(StoreError::EmptyIssue.abort());
                }

                let status = if all_fulfilled {
                    StoreIssueStatus::Issued
                } else {
                    StoreIssueStatus::PartiallyIssued
                };
                let mut posted = issue.clone();
                posted.status = status;
                issues.insert(posted.id.as_str(), db::tx_encode(&posted)?)?;
                Ok(status)
            })
            .map_err(StoreError::from)?;

        issue.status = status;
        info!(
            id = %issue.id,
            requisition = %issue.requisition_id,
            status = %issue.status,
            lines = issue.lines.len(),
            "store issue posted"
        );
        Ok(issue)
    }

    /// Take returned material back into stock.
    ///
    /// Lines that trace an issue line are capped so that cumulative returns
    /// never exceed what that line actually issued. Untraced lines only need
    /// a valid item.
    pub fn create_return(&self, draft: StoreReturnDraft) -> Result<StoreReturn> {
        if draft.returned_by.trim().is_empty() {
            return Err(StoreError::validation("returned_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a store return needs at least one line",
            ));
        }
        self.registry.department(&draft.department_id)?;

        let issue: Option<StoreIssue> = match &draft.store_issue_id {
            Some(id) => Some(db::load(&self.issues, RecordKind::StoreIssue, id)?),
            None => None,
        };

        // Resolved cap per traced line, carried into the transaction.
        let mut lines = Vec::with_capacity(draft.lines.len());
        let mut caps = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            if !self.registry.item_exists(&line.item_id)? {
                return Err(StoreError::not_found(RecordKind::Item, &line.item_id));
            }
            if line.quantity == 0 {
                return Err(StoreError::validation(
                    "returned quantity must be greater than 0",
                ));
            }
            if line.quantity > self.config.max_line_quantity {
                return Err(StoreError::validation(format!(
                    "returned quantity {} exceeds the configured maximum {}",
                    line.quantity, self.config.max_line_quantity
                )));
            }

            let cap = match &line.store_issue_line_id {
                Some(issue_line_id) => {
                    let issue = issue.as_ref().ok_or_else(|| {
                        StoreError::validation(
                            "a traced return line needs the return to name its store issue",
                        )
                    })?;
                    let issue_line =
                        issue
                            .line(issue_line_id)
                            .ok_or_else(|| StoreError::LineNotFound {
                                parent_id: issue.id.clone(),
                                line_id: issue_line_id.clone(),
                            })?;
                    if issue_line.item_id != line.item_id {
                        return Err(StoreError::LineMismatch {
                            line_id: issue_line_id.clone(),
                            detail: format!(
                                "declares item {} but the issue line carries {}",
                                line.item_id, issue_line.item_id
                            ),
                        });
                    }
                    Some(issue_line.issued_quantity)
                }
                None => None,
            };
            caps.push(cap);
            lines.push(StoreReturnLine {
                id: ids::mint(ids::STORE_RETURN_LINE)?,
                store_issue_line_id: line.store_issue_line_id.clone(),
                item_id: line.item_id.clone(),
                quantity: line.quantity,
                reason: line.reason.clone(),
            });
        }

        let ret = StoreReturn {
            id: ids::mint(ids::STORE_RETURN)?,
            store_issue_id: draft.store_issue_id,
            department_id: draft.department_id,
            returned_by: draft.returned_by,
            return_date: draft.return_date.unwrap_or_else(Day::today),
            remarks: draft.remarks,
            lines,
            created_at: TimeStamp::now(),
        };
        let encoded = db::encode(&ret)?;

        (&self.returns, &self.returned_totals, self.ledger.tree())
            .transaction(|(returns, totals, stock_tree)| {
                for (line, cap) in ret.lines.iter().zip(&caps) {
                    if let (Some(issue_line_id), Some(issued)) = (&line.store_issue_line_id, cap) {
                        let already = db::tx_read_total(totals, issue_line_id)?;
                        let cumulative = already.checked_add(line.quantity).ok_or_else(|| {
                            StoreError::validation("returned quantity overflow").abort()
                        })?;
                        if cumulative > *issued {
                            return Err(StoreError::OverReturn {
                                store_issue_line_id: issue_line_id.clone(),
                                issued: *issued,
                                already_returned: already,
                                attempted: line.quantity,
                            }
                            .abort());
                        }
                        db::tx_write_total(totals, issue_line_id, cumulative)?;
                    }
                    stock::tx_credit(stock_tree, &line.item_id, line.quantity)?;
                }
                returns.insert(ret.id.as_str(), encoded.clone())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        info!(
            id = %ret.id,
            issue = ?ret.store_issue_id,
            lines = ret.lines.len(),
            "store return posted"
        );
        Ok(ret)
    }

    /// Current stock record for a known item.
    pub fn stock(&self, item_id: &str) -> Result<StockRecord> {
        self.registry.item(item_id)?;
        self.ledger.get(item_id)
    }

    /// Stock records for a batch of items, preserving input order.
    /// Items that have never moved come back zero-valued.
    pub fn check_availability(&self, item_ids: &[String]) -> Result<Vec<StockRecord>> {
        item_ids.iter().map(|id| self.ledger.get(id)).collect()
    }

    pub fn list_stock(&self) -> Result<Vec<StockRecord>> {
        self.ledger.list()
    }

    pub fn issue(&self, id: &str) -> Result<StoreIssue> {
        db::load(&self.issues, RecordKind::StoreIssue, id)
    }

    pub fn store_return(&self, id: &str) -> Result<StoreReturn> {
        db::load(&self.returns, RecordKind::StoreReturn, id)
    }

    pub fn list_issues(&self) -> Result<Vec<StoreIssue>> {
        db::scan(&self.issues)
    }

    pub fn list_returns(&self) -> Result<Vec<StoreReturn>> {
        db::scan(&self.returns)
    }

    /// Cumulative issued quantity for a requisition line across all issues.
    pub fn issued_total(&self, requisition_line_id: &str) -> Result<u64> {
        db::read_total(&self.issued_totals, requisition_line_id)
    }

    /// Cumulative returned quantity for an issue line across all returns.
    pub fn returned_total(&self, store_issue_line_id: &str) -> Result<u64> {
        db::read_total(&self.returned_totals, store_issue_line_id)
    }
}
