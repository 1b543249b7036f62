// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionFlag {
    All,
    Add,
    View,
    Edit,
    Disable,
}

impl PermissionFlag {
    pub const ALL: [Self; 5] = [Self::All, Self::Add, Self::View, Self::Edit, Self::Disable];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Add => "add",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Disable => "disable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    pub name: String,
    pub all: bool,
    pub add: bool,
    pub view: bool,
    pub edit: bool,
    pub disable: bool,
}

impl PermissionRow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            all: false,
            add: false,
            view: false,
            edit: false,
            disable: false,
        }
    }

    pub const fn flag(&self, flag: PermissionFlag) -> bool {
        match flag {
            PermissionFlag::All => self.all,
            PermissionFlag::Add => self.add,
            PermissionFlag::View => self.view,
            PermissionFlag::Edit => self.edit,
            PermissionFlag::Disable => self.disable,
        }
    }

    pub const fn leaves_all_set(&self) -> bool {
        self.add && self.view && self.edit && self.disable
    }

    pub const fn any_set(&self) -> bool {
        self.all || self.add || self.view || self.edit || self.disable
    }

    /// Key used in the remote `permissions_hash`: lower-case, `_`-separated.
    pub fn remote_key(&self) -> String {
        let mut key = String::with_capacity(self.name.len());
        for ch in self.name.chars() {
            if ch.is_ascii_alphanumeric() {
                key.push(ch.to_ascii_lowercase());
            } else if !key.ends_with('_') {
                key.push('_');
            }
        }
        key.trim_matches('_').to_owned()
    }
}

/// Applies one checkbox change while keeping `all` equal to the four leaves.
pub fn apply_flag(row: &PermissionRow, flag: PermissionFlag, value: bool) -> PermissionRow {
    let mut next = row.clone();
    match flag {
        PermissionFlag::All => {
            next.all = value;
            next.add = value;
            next.view = value;
            next.edit = value;
            next.disable = value;
        }
        PermissionFlag::Add => next.add = value,
        PermissionFlag::View => next.view = value,
        PermissionFlag::Edit => next.edit = value,
        PermissionFlag::Disable => next.disable = value,
    }
    if flag != PermissionFlag::All {
        next.all = next.leaves_all_set();
    }
    next
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCategory {
    pub name: String,
    pub permissions: Vec<PermissionRow>,
}

impl PermissionCategory {
    pub fn new(name: impl Into<String>, rows: &[&str]) -> Self {
        let mut permissions: Vec<PermissionRow> = Vec::with_capacity(rows.len());
        for row in rows {
            if !permissions.iter().any(|existing| existing.name == *row) {
                permissions.push(PermissionRow::new(*row));
            }
        }
        Self {
            name: name.into(),
            permissions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitScope {
    All,
    Category(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    categories: Vec<PermissionCategory>,
    defaults: Vec<PermissionCategory>,
}

impl PermissionMatrix {
    pub fn new(categories: Vec<PermissionCategory>) -> Self {
        Self {
            defaults: categories.clone(),
            categories,
        }
    }

    pub fn categories(&self) -> &[PermissionCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&PermissionCategory> {
        self.categories.iter().find(|category| category.name == name)
    }

    pub fn set_category_all(&mut self, category: &str, enabled: bool) -> Result<()> {
        let category = self.category_mut(category)?;
        for row in &mut category.permissions {
            row.all = enabled;
            row.add = enabled;
            row.view = enabled;
            row.edit = enabled;
            row.disable = enabled;
        }
        Ok(())
    }

    pub fn set_row_flag(
        &mut self,
        category: &str,
        row_name: &str,
        flag: PermissionFlag,
        value: bool,
    ) -> Result<PermissionRow> {
        let category = self.category_mut(category)?;
        let category_name = category.name.clone();
        let row = category
            .permissions
            .iter_mut()
            .find(|row| row.name == row_name)
            .ok_or_else(|| anyhow!("permission `{row_name}` is not listed under {category_name}"))?;
        *row = apply_flag(row, flag, value);
        Ok(row.clone())
    }

    /// Header checkbox state: every row in the category is fully enabled.
    pub fn category_enabled(&self, category: &str) -> bool {
        self.category(category).is_some_and(|category| {
            !category.permissions.is_empty() && category.permissions.iter().all(|row| row.all)
        })
    }

    pub fn reset(&mut self) {
        self.categories = self.defaults.clone();
    }

    pub fn enabled_row_count(&self, scope: &SubmitScope) -> usize {
        self.rows_in_scope(scope)
            .filter(|row| row.any_set())
            .count()
    }

    pub fn permissions_hash(&self, scope: &SubmitScope) -> Value {
        let mut hash = Map::new();
        for row in self.rows_in_scope(scope) {
            let mut flags = Map::new();
            for flag in PermissionFlag::ALL {
                flags.insert(flag.as_str().to_owned(), Value::Bool(row.flag(flag)));
            }
            hash.insert(row.remote_key(), Value::Object(flags));
        }
        Value::Object(hash)
    }

    /// Create-role body in the shape the roles endpoint expects.
    pub fn role_payload(&self, role_name: &str, scope: &SubmitScope) -> Result<Value> {
        let name = role_name.trim();
        if name.is_empty() {
            return Err(anyhow!("role title is required -- enter a title and retry"));
        }
        if let SubmitScope::Category(category) = scope {
            self.category(category)
                .ok_or_else(|| anyhow!("unknown permission category {category:?}"))?;
        }
        Ok(json!({
            "lock_role": { "name": name },
            "permissions_hash": self.permissions_hash(scope),
            "lock_modules": self.enabled_row_count(scope),
        }))
    }

    fn rows_in_scope<'a>(
        &'a self,
        scope: &'a SubmitScope,
    ) -> impl Iterator<Item = &'a PermissionRow> + 'a {
        self.categories
            .iter()
            .filter(move |category| match scope {
                SubmitScope::All => true,
                SubmitScope::Category(name) => category.name == *name,
            })
            .flat_map(|category| category.permissions.iter())
    }

    fn category_mut(&mut self, name: &str) -> Result<&mut PermissionCategory> {
        self.categories
            .iter_mut()
            .find(|category| category.name == name)
            .ok_or_else(|| anyhow!("unknown permission category {name:?}"))
    }
}

pub const ALL_FUNCTIONS: &str = "All Functions";
pub const INVENTORY: &str = "Inventory";
pub const SETUP: &str = "Setup";
pub const QUICKGATE: &str = "Quickgate";

const ALL_FUNCTION_ROWS: &[&str] = &[
    "Broadcast",
    "Asset",
    "Documents",
    "Tickets",
    "Supplier",
    "Tasks",
    "Service",
    "Meters",
    "AMC",
    "Schedule",
    "Materials",
    "PO",
    "WO",
    "Report",
    "Attendance",
    "Business Directory",
    "PO Approval",
    "Dashboard",
    "Tracing",
    "BI Reports",
    "Restaurants",
    "My Ledgers",
    "Letter Of Indent",
    "Wo Invoices",
    "Bill",
    "Engineering Reports",
    "Events",
    "Customers",
    "QuickGate Report",
    "Task Management",
    "CEO Dashboard",
    "Operational Audit",
    "Mom Details",
    "Pms Design Inputs",
    "Vendor Audit",
    "Permits",
    "Pending Approvals",
    "Accounts",
    "Customer Bills",
    "My Bills",
    "Water",
    "STP",
    "Daily Readings",
    "Utility Consumption",
    "Utility Request",
    "Space",
    "Project Management",
    "Pms Incidents",
    "Site Dashboard",
    "Transport",
    "Waste Generation",
    "GDN",
    "Parking",
    "GDN Dispatch",
    "EV Consumption",
    "Msafe",
    "Permit Extend",
    "Local Travel Module",
    "KRCC",
    "Training",
    "Approve Krcc",
    "Line Manager Check",
    "Senior Management Tour",
    "Solar Generator",
    "Customer Permit",
    "Customer Parkings",
    "Customer Wallet",
    "Site Banners",
    "Testimonials",
    "Group And Channel Config",
    "Shared Content Config",
    "Site And Facility Config",
    "Occupant Users",
    "Non Re Users",
    "Resume Permit",
    "Permit Checklist",
    "Community Module",
    "Facility Setup",
    "Mail Room",
    "Parking Setup",
];

const INVENTORY_ROWS: &[&str] = &[
    "Inventory",
    "GRN",
    "SRNS",
    "Accounts",
    "Consumption",
    "Update Partial Inventory",
    "Update All Inventory",
    "Clone Inventory",
];

const SETUP_ROWS: &[&str] = &[
    "Account",
    "User & Roles",
    "Meter Types",
    "Asset Groups",
    "Ticket",
    "Email Rule",
    "FM Groups",
    "Export",
    "SAC/HSN Setup",
    "Addresses",
    "Master Checklist",
    "Occupant Users",
    "Approval Matrix",
    "Patrolling Approval Matrix",
    "Email Rule",
    "Task Escalation",
    "Ticket Setup",
    "Checklist Group",
];

const QUICKGATE_ROWS: &[&str] = &[
    "Visitors",
    "R Vehicles",
    "G Vehicles",
    "Staffs",
    "Goods In Out",
    "Patrolling",
];

pub fn default_role_catalog() -> Vec<PermissionCategory> {
    vec![
        PermissionCategory::new(ALL_FUNCTIONS, ALL_FUNCTION_ROWS),
        PermissionCategory::new(INVENTORY, INVENTORY_ROWS),
        PermissionCategory::new(SETUP, SETUP_ROWS),
        PermissionCategory::new(QUICKGATE, QUICKGATE_ROWS),
    ]
}
