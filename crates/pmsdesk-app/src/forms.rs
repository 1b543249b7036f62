// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::debounce::CONTACT_MOBILE_DIGITS;
use crate::draft::FormDraft;
use crate::payload::{FieldMapping, SubmitMethod};
use crate::validation::{Check, ValidationRule};
use crate::{CustomerProfile, FieldValue, FormKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Toggle,
    /// Path typed by the user, read into an attachment on commit.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub input: InputKind,
}

const fn text(name: &'static str, label: &'static str) -> FormField {
    FormField {
        name,
        label,
        input: InputKind::Text,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FormSchema {
    pub kind: FormKind,
    pub title: &'static str,
    pub method: SubmitMethod,
    pub endpoint: &'static str,
    pub fields: &'static [FormField],
    pub rules: &'static [ValidationRule],
    pub mappings: &'static [FieldMapping],
}

impl FormSchema {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

pub const ORGANIZATION_FIELDS: &[FormField] = &[
    text("name", "Name"),
    text("description", "Description"),
    text("domain", "Domain"),
    text("sub_domain", "Sub domain"),
    text("front_domain", "Front domain"),
    text("front_subdomain", "Front sub domain"),
    text("country_id", "Country id"),
    FormField {
        name: "active",
        label: "Active",
        input: InputKind::Toggle,
    },
    FormField {
        name: "logo",
        label: "Logo file",
        input: InputKind::File,
    },
    FormField {
        name: "powered_by_logo",
        label: "Powered-by logo file",
        input: InputKind::File,
    },
];

pub const ORGANIZATION_RULES: &[ValidationRule] = &[
    ValidationRule::new("name", Check::Required, "Organization name is required"),
    ValidationRule::new("domain", Check::Required, "Main domain is required"),
    ValidationRule::new(
        "domain",
        Check::Domain,
        "Please enter a valid main domain (e.g., example.com)",
    ),
    ValidationRule::new("sub_domain", Check::Required, "Sub domain is required"),
    ValidationRule::new("country_id", Check::Digits, "Country id must be a number"),
    ValidationRule::new("name", Check::MaxLen(255), "Organization name is too long"),
];

pub const ORGANIZATION_MAPPINGS: &[FieldMapping] = &[
    FieldMapping::text("name", "organization[name]"),
    FieldMapping::text("description", "organization[description]"),
    FieldMapping::text("domain", "organization[domain]"),
    FieldMapping::text("sub_domain", "organization[sub_domain]"),
    FieldMapping::text("front_domain", "organization[front_domain]"),
    FieldMapping::text("front_subdomain", "organization[front_subdomain]"),
    FieldMapping::text("country_id", "organization[country_id]"),
    FieldMapping::flag("active", "organization[active]"),
    FieldMapping::file("logo", "organization[logo]"),
    FieldMapping::file("powered_by_logo", "organization[powered_by_logo]"),
];

pub const ORGANIZATION_FORM: FormSchema = FormSchema {
    kind: FormKind::Organization,
    title: "Add organization",
    method: SubmitMethod::Post,
    endpoint: "/organizations.json",
    fields: ORGANIZATION_FIELDS,
    rules: ORGANIZATION_RULES,
    mappings: ORGANIZATION_MAPPINGS,
};

pub const CUSTOMER_NAME: &str = "customer_name";
pub const CUSTOMER_MOBILE: &str = "customer_mobile";
pub const CUSTOMER_EMAIL: &str = "customer_email";
pub const DELIVERY_ADDRESS: &str = "delivery_address";

pub const CONTACT_FIELDS: &[FormField] = &[
    text(CUSTOMER_NAME, "Name"),
    text(CUSTOMER_MOBILE, "Mobile"),
    text(CUSTOMER_EMAIL, "Email"),
    text(DELIVERY_ADDRESS, "Delivery address"),
    text("requests", "Special requests"),
];

pub const CONTACT_RULES: &[ValidationRule] = &[
    ValidationRule::new(CUSTOMER_NAME, Check::Required, "Name is required"),
    ValidationRule::new(CUSTOMER_MOBILE, Check::Required, "Mobile number is required"),
    ValidationRule::new(
        CUSTOMER_MOBILE,
        Check::Mobile {
            digits: CONTACT_MOBILE_DIGITS,
        },
        "Mobile number must be exactly 8 digits",
    ),
    ValidationRule::new(CUSTOMER_EMAIL, Check::Required, "Email is required"),
    ValidationRule::new(CUSTOMER_EMAIL, Check::Email, "Please enter a valid email address"),
    ValidationRule::new(DELIVERY_ADDRESS, Check::Required, "Delivery address is required"),
];

pub const CONTACT_MAPPINGS: &[FieldMapping] = &[
    FieldMapping::text(CUSTOMER_NAME, CUSTOMER_NAME),
    FieldMapping::text(CUSTOMER_MOBILE, CUSTOMER_MOBILE),
    FieldMapping::text(CUSTOMER_EMAIL, CUSTOMER_EMAIL),
    FieldMapping::text(DELIVERY_ADDRESS, DELIVERY_ADDRESS),
    FieldMapping::text("requests", "food_order[requests]").always(),
];

pub const CONTACT_FORM: FormSchema = FormSchema {
    kind: FormKind::Contact,
    title: "Contact details",
    method: SubmitMethod::Post,
    endpoint: "/pms/food_orders.json",
    fields: CONTACT_FIELDS,
    rules: CONTACT_RULES,
    mappings: CONTACT_MAPPINGS,
};

pub const ROLE_TITLE: &str = "role_name";
pub const ROLES_ENDPOINT: &str = "/lock_roles.json";

pub const ROLE_FIELDS: &[FormField] = &[text(ROLE_TITLE, "Role title")];

pub const ROLE_RULES: &[ValidationRule] = &[ValidationRule::new(
    ROLE_TITLE,
    Check::Required,
    "Role title is required",
)];

pub fn schema_for(kind: FormKind) -> Option<&'static FormSchema> {
    match kind {
        FormKind::Organization => Some(&ORGANIZATION_FORM),
        FormKind::Contact => Some(&CONTACT_FORM),
        FormKind::Role => None,
    }
}

/// Autofill values from a looked-up customer. Blank profile values keep what
/// the user already typed. Returns only the fields that change.
pub fn customer_autofill(
    draft: &FormDraft,
    profile: &CustomerProfile,
) -> Vec<(&'static str, FieldValue)> {
    [
        (CUSTOMER_NAME, profile.customer_name.as_str()),
        (CUSTOMER_MOBILE, profile.customer_mobile.as_str()),
        (CUSTOMER_EMAIL, profile.customer_email.as_str()),
        (DELIVERY_ADDRESS, profile.delivery_address.as_str()),
    ]
    .into_iter()
    .filter(|(name, value)| !value.trim().is_empty() && draft.text(name) != value.trim())
    .map(|(name, value)| (name, FieldValue::text(value.trim())))
    .collect()
}
