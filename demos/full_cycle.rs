//! End-to-end walk through the material flow: master data, a requisition
//! through both approval stages, procurement of the shortfall, goods
//! receipt into stock, a store issue and a partial return.

use plant_store::master::{NewDepartment, NewItem, NewVendor};
use plant_store::procurement::{
    GoodsReceiptDraft, GoodsReceiptLineDraft, PurchaseOrderDraft, PurchaseOrderLineDraft,
    PurchaseRequisitionDraft, PurchaseRequisitionLineDraft,
};
use plant_store::requisition::{DecisionAction, DecisionStage, RequisitionDraft, RequisitionLineDraft};
use plant_store::store::{
    StoreIssueDraft, StoreIssueLineDraft, StoreReturnDraft, StoreReturnLineDraft,
};
use plant_store::PlantStore;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let db = sled::open(dir.path().join("plant-store.db"))?;
    let plant = PlantStore::open(&db)?;

    let maintenance = plant.registry.create_department(NewDepartment {
        code: "MAINT".into(),
        name: "Maintenance".into(),
    })?;
    let grease = plant.registry.create_item(NewItem {
        code: "GRS-EP2".into(),
        description: "EP2 bearing grease".into(),
        uom: "KG".into(),
        min_stock: Some(10),
        reorder_level: Some(25),
    })?;
    let vendor = plant.registry.create_vendor(NewVendor {
        code: "LUBCO".into(),
        name: "Lubco Industrial Supplies".into(),
        gst_number: None,
        contact_email: Some("orders@lubco.example".into()),
        contact_phone: None,
    })?;

    let requisition = plant.requisitions.create(RequisitionDraft {
        department_id: maintenance.id.clone(),
        requested_by: "r.mehta".into(),
        required_by_date: None,
        remarks: Some("monthly lubrication round".into()),
        lines: vec![RequisitionLineDraft {
            item_id: grease.id.clone(),
            quantity: 40,
            purpose: Some("gearbox relube".into()),
        }],
    })?;
    let requisition = plant.requisitions.decide(
        &requisition.id,
        DecisionStage::Hod,
        DecisionAction::Approve,
        "hod.maint",
        None,
    )?;
    let requisition = plant.requisitions.decide(
        &requisition.id,
        DecisionStage::PlantHead,
        DecisionAction::Approve,
        "plant.head",
        Some("approved within budget".into()),
    )?;

    // Nothing in stock yet, so procure before issuing.
    let pr = plant.procurement.create_purchase_requisition(PurchaseRequisitionDraft {
        requisition_id: Some(requisition.id.clone()),
        department_id: None,
        requested_by: "stores.clerk".into(),
        required_by_date: None,
        remarks: None,
        lines: vec![PurchaseRequisitionLineDraft {
            item_id: grease.id.clone(),
            quantity: 50,
            purpose: None,
        }],
    })?;
    let order = plant.procurement.create_purchase_order(PurchaseOrderDraft {
        purchase_requisition_id: pr.id.clone(),
        vendor_id: vendor.id.clone(),
        department_id: None,
        created_by: "purchase.officer".into(),
        order_date: None,
        expected_delivery_date: None,
        remarks: None,
        lines: vec![PurchaseOrderLineDraft {
            purchase_requisition_line_id: pr.lines[0].id.clone(),
            item_id: grease.id.clone(),
            quantity: 50,
            unit_price: 42_500,
            remarks: None,
        }],
    })?;
    let receipt = plant.procurement.create_goods_receipt(GoodsReceiptDraft {
        purchase_order_id: order.id.clone(),
        received_by: "gate.stores".into(),
        receipt_date: None,
        remarks: None,
        lines: vec![GoodsReceiptLineDraft {
            purchase_order_line_id: order.lines[0].id.clone(),
            item_id: grease.id.clone(),
            received_quantity: 50,
        }],
    })?;
    println!(
        "received {} on {}, order now {}",
        receipt.lines[0].received_quantity,
        receipt.receipt_date.as_naive(),
        plant.procurement.purchase_order(&order.id)?.status
    );

    let issue = plant.store.create_issue(StoreIssueDraft {
        requisition_id: requisition.id.clone(),
        issued_by: "stores.clerk".into(),
        issue_date: None,
        remarks: None,
        lines: vec![StoreIssueLineDraft {
            requisition_line_id: requisition.lines[0].id.clone(),
            issued_quantity: 40,
        }],
    })?;
    println!("issue {} posted as {}", issue.id, issue.status);

    // Half a drum comes back unused.
    plant.store.create_return(StoreReturnDraft {
        store_issue_id: Some(issue.id.clone()),
        department_id: maintenance.id.clone(),
        returned_by: "r.mehta".into(),
        return_date: None,
        remarks: None,
        lines: vec![StoreReturnLineDraft {
            store_issue_line_id: Some(issue.lines[0].id.clone()),
            item_id: grease.id.clone(),
            quantity: 5,
            reason: Some("unused".into()),
        }],
    })?;

    let stock = plant.store.stock(&grease.id)?;
    println!("closing stock for {}: {} {}", grease.code, stock.available, grease.uom);

    Ok(())
}
