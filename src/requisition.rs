//! Department requisitions and their two-tier approval workflow.
//!
//! A requisition is born `PENDING_HOD_APPROVAL` and only ever moves through
//! [`RequisitionStatus::on_decision`], the single dispatch point that
//! encodes the transition table. Rejections and final approval are terminal;
//! a failed transition leaves the record untouched.

use chrono::Utc;
use tracing::info;

use crate::config::ServiceConfig;
use crate::db;
use crate::error::{RecordKind, Result, StoreError};
use crate::ids;
use crate::master::MasterRegistry;
use crate::types::{Day, TimeStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum RequisitionStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingHodApproval,
    #[n(2)]
    RejectedByHod,
    #[n(3)]
    PendingPlantHeadApproval,
    #[n(4)]
    RejectedByPlantHead,
    #[n(5)]
    Approved,
    #[n(6)]
    Cancelled,
}

impl core::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            RequisitionStatus::Draft => "DRAFT",
            RequisitionStatus::PendingHodApproval => "PENDING_HOD_APPROVAL",
            RequisitionStatus::RejectedByHod => "REJECTED_BY_HOD",
            RequisitionStatus::PendingPlantHeadApproval => "PENDING_PLANT_HEAD_APPROVAL",
            RequisitionStatus::RejectedByPlantHead => "REJECTED_BY_PLANT_HEAD",
            RequisitionStatus::Approved => "APPROVED",
            RequisitionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStage {
    Hod,
    PlantHead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
}

fn decision_label(stage: DecisionStage, action: DecisionAction) -> String {
    let verb = match action {
        DecisionAction::Approve => "APPROVE",
        DecisionAction::Reject => "REJECT",
    };
    let by = match stage {
        DecisionStage::Hod => "HOD",
        DecisionStage::PlantHead => "PLANT_HEAD",
    };
    format!("{verb}_BY_{by}")
}

impl RequisitionStatus {
    /// The approval transition table. Anything not listed is an invalid
    /// transition and leaves the requisition unmodified.
    pub fn on_decision(self, stage: DecisionStage, action: DecisionAction) -> Result<Self> {
        use DecisionAction::*;
        use DecisionStage::*;
        use RequisitionStatus::*;

        match (self, stage, action) {
            (PendingHodApproval, Hod, Approve) => Ok(PendingPlantHeadApproval),
            (PendingHodApproval, Hod, Reject) => Ok(RejectedByHod),
            (PendingPlantHeadApproval, PlantHead, Approve) => Ok(Approved),
            (PendingPlantHeadApproval, PlantHead, Reject) => Ok(RejectedByPlantHead),
            (from, stage, action) => Err(StoreError::InvalidStateTransition {
                from: from.to_string(),
                action: decision_label(stage, action),
            }),
        }
    }
}

/// Who decided, when, and with what remarks.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DecisionRecord {
    #[n(0)]
    pub decided_by: String,
    #[n(1)]
    pub remarks: Option<String>,
    #[n(2)]
    pub decided_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RequisitionLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub item_id: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub purpose: Option<String>,
}

/// Aggregate root: a requisition owns its lines for life.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Requisition {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub department_id: String,
    #[n(2)]
    pub requested_by: String,
    #[n(3)]
    pub required_by_date: Option<Day>,
    #[n(4)]
    pub remarks: Option<String>,
    #[n(5)]
    pub status: RequisitionStatus,
    #[n(6)]
    pub lines: Vec<RequisitionLine>,
    #[n(7)]
    pub hod_decision: Option<DecisionRecord>,
    #[n(8)]
    pub plant_head_decision: Option<DecisionRecord>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

impl Requisition {
    pub fn line(&self, line_id: &str) -> Option<&RequisitionLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }
}

pub struct RequisitionDraft {
    pub department_id: String,
    pub requested_by: String,
    pub required_by_date: Option<Day>,
    pub remarks: Option<String>,
    pub lines: Vec<RequisitionLineDraft>,
}

pub struct RequisitionLineDraft {
    pub item_id: String,
    pub quantity: u64,
    pub purpose: Option<String>,
}

#[derive(Clone)]
pub struct RequisitionService {
    tree: sled::Tree,
    registry: MasterRegistry,
    config: ServiceConfig,
}

impl RequisitionService {
    pub fn open(db: &sled::Db, registry: MasterRegistry) -> Result<Self> {
        Self::open_with(db, registry, ServiceConfig::default())
    }

    pub fn open_with(db: &sled::Db, registry: MasterRegistry, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            tree: db::open_tree(db, db::REQUISITIONS)?,
            registry,
            config,
        })
    }

    /// Create a requisition; it enters the workflow pending HOD approval.
    pub fn create(&self, draft: RequisitionDraft) -> Result<Requisition> {
        if draft.requested_by.trim().is_empty() {
            return Err(StoreError::validation("requested_by must not be blank"));
        }
        if draft.lines.is_empty() {
            return Err(StoreError::validation(
                "a requisition needs at least one line",
            ));
        }
        self.registry.department(&draft.department_id)?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in draft.lines {
            if !self.registry.item_exists(&line.item_id)? {
                return Err(StoreError::not_found(RecordKind::Item, &line.item_id));
            }
            if line.quantity == 0 {
                return Err(StoreError::validation(
                    "requested quantity must be greater than 0",
                ));
            }
            if line.quantity > self.config.max_line_quantity {
                return Err(StoreError::validation(format!(
                    "requested quantity {} exceeds the configured maximum {}",
                    line.quantity, self.config.max_line_quantity
                )));
            }
            lines.push(RequisitionLine {
                id: ids::mint(ids::REQUISITION_LINE)?,
                item_id: line.item_id,
                quantity: line.quantity,
                purpose: line.purpose,
            });
        }

        let now = TimeStamp::now();
        let requisition = Requisition {
            id: ids::mint(ids::REQUISITION)?,
            department_id: draft.department_id,
            requested_by: draft.requested_by,
            required_by_date: draft.required_by_date,
            remarks: draft.remarks,
            status: RequisitionStatus::PendingHodApproval,
            lines,
            hod_decision: None,
            plant_head_decision: None,
            created_at: now,
            updated_at: now,
        };
        db::store(&self.tree, &requisition.id, &requisition)?;
        info!(
            id = %requisition.id,
            department = %requisition.department_id,
            lines = requisition.lines.len(),
            "requisition created"
        );
        Ok(requisition)
    }

    /// Apply an approval decision. Stamps the stage's decision record and
    /// `updated_at`; an invalid transition changes nothing.
    pub fn decide(
        &self,
        id: &str,
        stage: DecisionStage,
        action: DecisionAction,
        decided_by: &str,
        remarks: Option<String>,
    ) -> Result<Requisition> {
        if decided_by.trim().is_empty() {
            return Err(StoreError::validation("decided_by must not be blank"));
        }

        let mut requisition: Requisition = db::load(&self.tree, RecordKind::Requisition, id)?;
        let next = requisition.status.on_decision(stage, action)?;

        let now = TimeStamp::now();
        let record = DecisionRecord {
            decided_by: decided_by.to_string(),
            remarks,
            decided_at: now,
        };
        match stage {
            DecisionStage::Hod => requisition.hod_decision = Some(record),
            DecisionStage::PlantHead => requisition.plant_head_decision = Some(record),
        }
        let previous = requisition.status;
        requisition.status = next;
        requisition.updated_at = now;

        db::store(&self.tree, &requisition.id, &requisition)?;
        info!(
            id = %requisition.id,
            from = %previous,
            to = %requisition.status,
            "requisition decision applied"
        );
        Ok(requisition)
    }

    pub fn get(&self, id: &str) -> Result<Requisition> {
        db::load(&self.tree, RecordKind::Requisition, id)
    }

    pub fn list(&self) -> Result<Vec<Requisition>> {
        db::scan(&self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_covers_the_happy_path() {
        use DecisionAction::*;
        use DecisionStage::*;

        let status = RequisitionStatus::PendingHodApproval;
        let status = status.on_decision(Hod, Approve).unwrap();
        assert_eq!(status, RequisitionStatus::PendingPlantHeadApproval);
        let status = status.on_decision(PlantHead, Approve).unwrap();
        assert_eq!(status, RequisitionStatus::Approved);
    }

    #[test]
    fn rejections_are_reachable_from_their_stage_only() {
        use DecisionAction::*;
        use DecisionStage::*;

        assert_eq!(
            RequisitionStatus::PendingHodApproval
                .on_decision(Hod, Reject)
                .unwrap(),
            RequisitionStatus::RejectedByHod
        );
        assert_eq!(
            RequisitionStatus::PendingPlantHeadApproval
                .on_decision(PlantHead, Reject)
                .unwrap(),
            RequisitionStatus::RejectedByPlantHead
        );
        assert!(
            RequisitionStatus::PendingHodApproval
                .on_decision(PlantHead, Reject)
                .is_err()
        );
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        use DecisionAction::*;
        use DecisionStage::*;

        for terminal in [
            RequisitionStatus::Approved,
            RequisitionStatus::RejectedByHod,
            RequisitionStatus::RejectedByPlantHead,
        ] {
            for stage in [Hod, PlantHead] {
                for action in [Approve, Reject] {
                    let err = terminal.on_decision(stage, action).unwrap_err();
                    assert!(matches!(err, StoreError::InvalidStateTransition { .. }));
                }
            }
        }
    }

    #[test]
    fn skipping_the_hod_stage_is_rejected() {
        let err = RequisitionStatus::PendingHodApproval
            .on_decision(DecisionStage::PlantHead, DecisionAction::Approve)
            .unwrap_err();
        match err {
            StoreError::InvalidStateTransition { from, action } => {
                assert_eq!(from, "PENDING_HOD_APPROVAL");
                assert_eq!(action, "APPROVE_BY_PLANT_HEAD");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
