//! Requisition workflow behavior against a real database.

use plant_store::master::{NewDepartment, NewItem};
use plant_store::requisition::{
    DecisionAction, DecisionStage, RequisitionDraft, RequisitionLineDraft, RequisitionStatus,
};
use plant_store::{PlantStore, StoreError};

fn plant() -> (tempfile::TempDir, PlantStore) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("plant.db")).unwrap();
    let plant = PlantStore::open(&db).unwrap();
    (dir, plant)
}

fn seed_masters(plant: &PlantStore) -> (String, String) {
    let department = plant
        .registry
        .create_department(NewDepartment {
            code: "PROD".into(),
            name: "Production".into(),
        })
        .unwrap();
    let item = plant
        .registry
        .create_item(NewItem {
            code: "BRG-6204".into(),
            description: "Deep groove ball bearing 6204".into(),
            uom: "NOS".into(),
            min_stock: None,
            reorder_level: None,
        })
        .unwrap();
    (department.id, item.id)
}

fn draft(department_id: &str, item_id: &str, quantity: u64) -> RequisitionDraft {
    RequisitionDraft {
        department_id: department_id.to_string(),
        requested_by: "operator.one".into(),
        required_by_date: None,
        remarks: None,
        lines: vec![RequisitionLineDraft {
            item_id: item_id.to_string(),
            quantity,
            purpose: None,
        }],
    }
}

#[test]
fn a_new_requisition_enters_the_workflow_pending_hod() {
    let (_dir, plant) = plant();
    let (department_id, item_id) = seed_masters(&plant);

    let requisition = plant
        .requisitions
        .create(draft(&department_id, &item_id, 12))
        .unwrap();

    assert_eq!(requisition.status, RequisitionStatus::PendingHodApproval);
    assert_eq!(requisition.lines.len(), 1);
    assert!(requisition.lines[0].id.starts_with("reql_"));
    assert!(requisition.hod_decision.is_none());

    // Read-your-writes: the returned aggregate is what the store holds.
    let reloaded = plant.requisitions.get(&requisition.id).unwrap();
    assert_eq!(reloaded, requisition);
}

#[test]
fn creation_validates_masters_and_quantities() {
    let (_dir, plant) = plant();
    let (department_id, item_id) = seed_masters(&plant);

    assert!(matches!(
        plant.requisitions.create(draft("dept_missing", &item_id, 5)),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        plant
            .requisitions
            .create(draft(&department_id, "item_missing", 5)),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        plant.requisitions.create(draft(&department_id, &item_id, 0)),
        Err(StoreError::Validation(_))
    ));

    let mut blank = draft(&department_id, &item_id, 5);
    blank.requested_by = "  ".into();
    assert!(matches!(
        plant.requisitions.create(blank),
        Err(StoreError::Validation(_))
    ));

    let mut empty = draft(&department_id, &item_id, 5);
    empty.lines.clear();
    assert!(matches!(
        plant.requisitions.create(empty),
        Err(StoreError::Validation(_))
    ));
}

#[test]
fn both_stages_approve_in_order() {
    let (_dir, plant) = plant();
    let (department_id, item_id) = seed_masters(&plant);
    let requisition = plant
        .requisitions
        .create(draft(&department_id, &item_id, 12))
        .unwrap();

    let requisition = plant
        .requisitions
        .decide(
            &requisition.id,
            DecisionStage::Hod,
            DecisionAction::Approve,
            "hod.prod",
            None,
        )
        .unwrap();
    assert_eq!(requisition.status, RequisitionStatus::PendingPlantHeadApproval);
    assert_eq!(
        requisition.hod_decision.as_ref().unwrap().decided_by,
        "hod.prod"
    );

    let requisition = plant
        .requisitions
        .decide(
            &requisition.id,
            DecisionStage::PlantHead,
            DecisionAction::Approve,
            "plant.head",
            Some("ok".into()),
        )
        .unwrap();
    assert_eq!(requisition.status, RequisitionStatus::Approved);
    assert!(requisition.plant_head_decision.is_some());
}

#[test]
fn skipping_a_stage_leaves_the_record_untouched() {
    let (_dir, plant) = plant();
    let (department_id, item_id) = seed_masters(&plant);
    let created = plant
        .requisitions
        .create(draft(&department_id, &item_id, 12))
        .unwrap();

    let err = plant
        .requisitions
        .decide(
            &created.id,
            DecisionStage::PlantHead,
            DecisionAction::Approve,
            "plant.head",
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidStateTransition { .. }));

    let reloaded = plant.requisitions.get(&created.id).unwrap();
    assert_eq!(reloaded.status, RequisitionStatus::PendingHodApproval);
    assert_eq!(reloaded.updated_at, created.updated_at);
    assert!(reloaded.plant_head_decision.is_none());
}

#[test]
fn a_rejection_is_terminal() {
    let (_dir, plant) = plant();
    let (department_id, item_id) = seed_masters(&plant);
    let requisition = plant
        .requisitions
        .create(draft(&department_id, &item_id, 12))
        .unwrap();

    let requisition = plant
        .requisitions
        .decide(
            &requisition.id,
            DecisionStage::Hod,
            DecisionAction::Reject,
            "hod.prod",
            Some("not budgeted".into()),
        )
        .unwrap();
    assert_eq!(requisition.status, RequisitionStatus::RejectedByHod);

    let err = plant
        .requisitions
        .decide(
            &requisition.id,
            DecisionStage::Hod,
            DecisionAction::Approve,
            "hod.prod",
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidStateTransition { .. }));
}

#[test]
fn duplicate_master_codes_are_rejected() {
    let (_dir, plant) = plant();
    seed_masters(&plant);

    let err = plant
        .registry
        .create_department(NewDepartment {
            code: "PROD".into(),
            name: "Production (again)".into(),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(plant.registry.list_departments().unwrap().len(), 1);
}
