//! Master-data registries: items, departments, vendors.
//!
//! Simple unique-code registries with no derived state. The core components
//! only ever read them (find by id, existence checks); nothing here mutates
//! stock or documents.

use sled::Transactional;
use tracing::info;

use crate::db;
use crate::error::{RecordKind, Result, StoreError};
use crate::ids;

/// Stock-keeping item master record.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Item {
    #[n(0)]
    pub id: String,
    /// SKU / item code, unique across the plant.
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub description: String,
    /// Unit of measure, e.g. KG, LTR, NOS.
    #[n(3)]
    pub uom: String,
    #[n(4)]
    pub min_stock: Option<u64>,
    #[n(5)]
    pub reorder_level: Option<u64>,
    #[n(6)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Department {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Vendor {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub gst_number: Option<String>,
    #[n(4)]
    pub contact_email: Option<String>,
    #[n(5)]
    pub contact_phone: Option<String>,
    #[n(6)]
    pub active: bool,
}

pub struct NewItem {
    pub code: String,
    pub description: String,
    pub uom: String,
    pub min_stock: Option<u64>,
    pub reorder_level: Option<u64>,
}

pub struct NewDepartment {
    pub code: String,
    pub name: String,
}

pub struct NewVendor {
    pub code: String,
    pub name: String,
    pub gst_number: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Clone)]
pub struct MasterRegistry {
    items: sled::Tree,
    item_codes: sled::Tree,
    departments: sled::Tree,
    department_codes: sled::Tree,
    vendors: sled::Tree,
    vendor_codes: sled::Tree,
}

impl MasterRegistry {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            items: db::open_tree(db, db::ITEMS)?,
            item_codes: db::open_tree(db, db::ITEM_CODES)?,
            departments: db::open_tree(db, db::DEPARTMENTS)?,
            department_codes: db::open_tree(db, db::DEPARTMENT_CODES)?,
            vendors: db::open_tree(db, db::VENDORS)?,
            vendor_codes: db::open_tree(db, db::VENDOR_CODES)?,
        })
    }

    pub fn create_item(&self, new: NewItem) -> Result<Item> {
        let code = normalized_code(&new.code)?;
        let item = Item {
            id: ids::mint(ids::ITEM)?,
            code,
            description: new.description,
            uom: new.uom,
            min_stock: new.min_stock,
            reorder_level: new.reorder_level,
            active: true,
        };
        register(&self.items, &self.item_codes, &item.id, &item.code, &item)?;
        info!(id = %item.id, code = %item.code, "item registered");
        Ok(item)
    }

    pub fn create_department(&self, new: NewDepartment) -> Result<Department> {
        let code = normalized_code(&new.code)?;
        let department = Department {
            id: ids::mint(ids::DEPARTMENT)?,
            code,
            name: new.name,
            active: true,
        };
        register(
            &self.departments,
            &self.department_codes,
            &department.id,
            &department.code,
            &department,
        )?;
        info!(id = %department.id, code = %department.code, "department registered");
        Ok(department)
    }

    pub fn create_vendor(&self, new: NewVendor) -> Result<Vendor> {
        let code = normalized_code(&new.code)?;
        let vendor = Vendor {
            id: ids::mint(ids::VENDOR)?,
            code,
            name: new.name,
            gst_number: new.gst_number,
            contact_email: new.contact_email,
            contact_phone: new.contact_phone,
            active: true,
        };
        register(
            &self.vendors,
            &self.vendor_codes,
            &vendor.id,
            &vendor.code,
            &vendor,
        )?;
        info!(id = %vendor.id, code = %vendor.code, "vendor registered");
        Ok(vendor)
    }

    pub fn item(&self, id: &str) -> Result<Item> {
        db::load(&self.items, RecordKind::Item, id)
    }

    pub fn department(&self, id: &str) -> Result<Department> {
        db::load(&self.departments, RecordKind::Department, id)
    }

    pub fn vendor(&self, id: &str) -> Result<Vendor> {
        db::load(&self.vendors, RecordKind::Vendor, id)
    }

    pub fn item_exists(&self, id: &str) -> Result<bool> {
        Ok(self.items.contains_key(id)?)
    }

    pub fn find_item_by_code(&self, code: &str) -> Result<Option<Item>> {
        find_by_code(&self.items, &self.item_codes, code)
    }

    pub fn find_department_by_code(&self, code: &str) -> Result<Option<Department>> {
        find_by_code(&self.departments, &self.department_codes, code)
    }

    pub fn find_vendor_by_code(&self, code: &str) -> Result<Option<Vendor>> {
        find_by_code(&self.vendors, &self.vendor_codes, code)
    }

    pub fn list_items(&self) -> Result<Vec<Item>> {
        db::scan(&self.items)
    }

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        db::scan(&self.departments)
    }

    pub fn list_vendors(&self) -> Result<Vec<Vendor>> {
        db::scan(&self.vendors)
    }
}

fn find_by_code<T: for<'b> minicbor::Decode<'b, ()>>(
    records: &sled::Tree,
    codes: &sled::Tree,
    code: &str,
) -> Result<Option<T>> {
    match codes.get(code.trim())? {
        Some(id) => {
            let id = String::from_utf8_lossy(&id).into_owned();
            db::fetch(records, &id)
        }
        None => Ok(None),
    }
}

fn normalized_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(StoreError::validation("code must not be blank"));
    }
    Ok(code.to_string())
}

/// Insert record and code index together; duplicate codes are rejected
/// atomically with the insert.
fn register<T: minicbor::Encode<()>>(
    records: &sled::Tree,
    codes: &sled::Tree,
    id: &str,
    code: &str,
    record: &T,
) -> Result<()> {
    let encoded = db::encode(record)?;
    (records, codes)
        .transaction(|(records, codes)| {
            if codes.get(code)?.is_some() {
                return Err(
                    StoreError::validation(format!("code already registered: {code}")).abort(),
                );
            }
            codes.insert(code, id.as_bytes().to_vec())?;
            records.insert(id, encoded.clone())?;
            Ok(())
        })
        .map_err(StoreError::from)
}
