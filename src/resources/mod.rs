//! Catalogue of tenant-scoped resources served by the generic data routes.
//!
//! Each definition is the single place that states a table's writable
//! columns, search columns, who may write it and how administrators see it.

use crate::auth::Role;
use crate::tenant::ScopePolicy;
use crate::uploads::DocumentSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Uuid,
    Date,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub searchable: bool,
    /// False for system columns and upload slots, which have their own routes
    pub writable: bool,
    /// Resource whose `id` this column holds. The referenced row must belong
    /// to the same client.
    pub references: Option<&'static ResourceDef>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, required: false, searchable: false, writable: true, references: None }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub const fn references(mut self, target: &'static ResourceDef) -> Self {
        self.references = Some(target);
        self
    }
}

const fn text(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Text)
}
const fn int(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Integer)
}
const fn decimal(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Decimal)
}
const fn boolean(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Boolean)
}
const fn uuid(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Uuid)
}
const fn date(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Date)
}
const fn timestamp(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnKind::Timestamp)
}

/// Columns every resource table carries
pub static SYSTEM_COLUMNS: [ColumnDef; 4] = [
    uuid("id").read_only(),
    text("client_id").read_only(),
    timestamp("created_at").read_only(),
    timestamp("updated_at").read_only(),
];

#[derive(Debug)]
pub struct ResourceDef {
    /// Route segment, e.g. `processing-lots`
    pub name: &'static str,
    pub table: &'static str,
    pub label: &'static str,
    pub columns: &'static [ColumnDef],
    pub scope: ScopePolicy,
    pub default_order: &'static str,
    pub write_roles: &'static [Role],
    pub delete_roles: &'static [Role],
    pub slots: &'static [DocumentSlot],
    /// Dedicated route that owns writes, when the generic create and update
    /// must not be used
    pub written_via: Option<&'static str>,
}

impl ResourceDef {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        SYSTEM_COLUMNS
            .iter()
            .chain(self.columns.iter())
            .find(|c| c.name == name)
    }

    pub fn searchable_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.searchable)
    }

    pub fn can_write(&self, role: Role) -> bool {
        self.write_roles.contains(&role)
    }

    pub fn has_slot(&self, slot: DocumentSlot) -> bool {
        self.slots.contains(&slot)
    }

    pub fn reference_columns(&self) -> impl Iterator<Item = &'static ColumnDef> {
        self.columns.iter().filter(|c| c.references.is_some())
    }
}

const OPERATIONS: &[Role] = &[Role::Administrator, Role::Manager, Role::Technician];
const MANAGEMENT: &[Role] = &[Role::Administrator, Role::Manager];
const EVERYONE: &[Role] = &[Role::Administrator, Role::Manager, Role::Technician, Role::Client];

pub static ASSETS: ResourceDef = ResourceDef {
    name: "assets",
    table: "assets",
    label: "Asset",
    columns: &[
        text("asset_tag").required().searchable(),
        text("serial_number").searchable(),
        text("category").required().searchable(),
        text("manufacturer").searchable(),
        text("model").searchable(),
        text("status").required(),
        text("condition"),
        boolean("data_bearing"),
        text("sanitization_method"),
        timestamp("sanitized_at"),
        text("disposition"),
        date("disposition_date"),
        decimal("weight_kg"),
        decimal("estimated_value"),
        decimal("resale_value"),
        text("location").searchable(),
        uuid("shipment_id").references(&SHIPMENTS),
        uuid("processing_lot_id").references(&PROCESSING_LOTS),
        date("received_date"),
        text("notes"),
        text("certificate_of_destruction_path").read_only(),
    ],
    scope: ScopePolicy::AdministratorSeesAll,
    default_order: "created_at desc",
    write_roles: OPERATIONS,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::CertificateOfDestruction],
};

pub static SHIPMENTS: ResourceDef = ResourceDef {
    name: "shipments",
    table: "shipments",
    label: "Shipment",
    columns: &[
        text("shipment_number").required().searchable(),
        text("origin_address").searchable(),
        text("destination_address"),
        text("carrier").searchable(),
        text("tracking_number").searchable(),
        text("status").required(),
        date("scheduled_date"),
        date("received_date"),
        decimal("total_weight_kg"),
        int("pallet_count"),
        uuid("vendor_id").references(&VENDORS),
        text("notes"),
        text("bill_of_lading_path").read_only(),
        text("manifest_path").read_only(),
    ],
    scope: ScopePolicy::AdministratorSeesAll,
    default_order: "created_at desc",
    write_roles: OPERATIONS,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::BillOfLading, DocumentSlot::Manifest],
};

pub static PROCESSING_LOTS: ResourceDef = ResourceDef {
    name: "processing-lots",
    table: "processing_lots",
    label: "Processing lot",
    columns: &[
        text("lot_number").required().searchable(),
        text("description").searchable(),
        text("material_type").searchable(),
        text("status").required(),
        decimal("gross_weight_kg"),
        decimal("net_weight_kg"),
        date("start_date"),
        date("completion_date"),
        uuid("vendor_id").references(&VENDORS),
        text("notes"),
        text("certificate_of_recycling_path").read_only(),
    ],
    scope: ScopePolicy::AdministratorSeesAll,
    default_order: "created_at desc",
    write_roles: OPERATIONS,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::CertificateOfRecycling],
};

pub static VENDORS: ResourceDef = ResourceDef {
    name: "vendors",
    table: "vendors",
    label: "Vendor",
    columns: &[
        text("name").required().searchable(),
        text("vendor_type").searchable(),
        text("contact_name").searchable(),
        text("contact_email").searchable(),
        text("phone"),
        text("address"),
        text("certification"),
        date("certification_expiry"),
        boolean("is_active"),
        text("certification_path").read_only(),
    ],
    scope: ScopePolicy::TenantOnly,
    default_order: "name asc",
    write_roles: MANAGEMENT,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::Certification],
};

pub static COMPLIANCE_DOCUMENTS: ResourceDef = ResourceDef {
    name: "compliance-documents",
    table: "compliance_documents",
    label: "Compliance document",
    columns: &[
        text("title").required().searchable(),
        text("document_type").required().searchable(),
        text("issuing_authority").searchable(),
        text("document_number").searchable(),
        date("issue_date"),
        date("expiry_date"),
        text("status"),
        text("notes"),
        text("file_path").read_only(),
    ],
    scope: ScopePolicy::AdministratorSeesAll,
    default_order: "expiry_date asc",
    write_roles: MANAGEMENT,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::ComplianceFile],
};

pub static CHAIN_OF_CUSTODY: ResourceDef = ResourceDef {
    name: "chain-of-custody",
    table: "chain_of_custody",
    label: "Custody event",
    columns: &[
        uuid("asset_id").required().references(&ASSETS),
        text("from_location").searchable(),
        text("to_location").searchable(),
        text("status").required(),
        text("handler").searchable(),
        text("notes"),
        timestamp("event_at"),
    ],
    scope: ScopePolicy::TenantOnly,
    default_order: "event_at desc",
    write_roles: OPERATIONS,
    delete_roles: &[Role::Administrator],
    slots: &[],
    written_via: Some("/api/assets/:id/custody"),
};

pub static CONTRACTOR_TECHNICIANS: ResourceDef = ResourceDef {
    name: "contractor-technicians",
    table: "contractor_technicians",
    label: "Contractor technician",
    columns: &[
        text("full_name").required().searchable(),
        text("email").searchable(),
        text("phone"),
        text("company").searchable(),
        text("skills").searchable(),
        text("certification"),
        date("certification_expiry"),
        boolean("is_active"),
        text("background_check_path").read_only(),
        text("insurance_path").read_only(),
        text("certification_path").read_only(),
    ],
    scope: ScopePolicy::TenantOnly,
    default_order: "full_name asc",
    write_roles: MANAGEMENT,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::BackgroundCheck, DocumentSlot::Insurance, DocumentSlot::Certification],
};

pub static REVERSE_REQUESTS: ResourceDef = ResourceDef {
    name: "reverse-requests",
    table: "reverse_requests",
    label: "Reverse logistics request",
    columns: &[
        text("request_number").required().searchable(),
        text("requester_name").required().searchable(),
        text("contact_email").searchable(),
        text("contact_phone"),
        text("pickup_address").required(),
        int("item_count"),
        text("status").required(),
        date("requested_date"),
        date("scheduled_pickup_date"),
        text("notes"),
        text("attachment_path").read_only(),
    ],
    scope: ScopePolicy::AdministratorSeesAll,
    default_order: "created_at desc",
    write_roles: EVERYONE,
    delete_roles: MANAGEMENT,
    written_via: None,
    slots: &[DocumentSlot::Attachment],
};

pub static RESOURCES: [&ResourceDef; 8] = [
    &ASSETS,
    &SHIPMENTS,
    &PROCESSING_LOTS,
    &VENDORS,
    &COMPLIANCE_DOCUMENTS,
    &CHAIN_OF_CUSTODY,
    &CONTRACTOR_TECHNICIANS,
    &REVERSE_REQUESTS,
];

pub fn lookup(name: &str) -> Option<&'static ResourceDef> {
    RESOURCES.iter().copied().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_slot_has_a_read_only_column() {
        for resource in RESOURCES.iter() {
            for slot in resource.slots {
                let column = resource
                    .column(slot.column())
                    .unwrap_or_else(|| panic!("{} lacks column for {:?}", resource.name, slot));
                assert!(!column.writable, "{}.{} must not be writable", resource.name, column.name);
            }
        }
    }

    #[test]
    fn system_columns_resolve_for_all_resources() {
        for resource in RESOURCES.iter() {
            assert!(resource.column("client_id").is_some());
            assert!(resource.column("created_at").is_some());
            assert!(resource.searchable_columns().count() > 0, "{} has no search columns", resource.name);
        }
    }

    #[test]
    fn lookup_by_route_segment() {
        assert_eq!(lookup("processing-lots").unwrap().table, "processing_lots");
        assert!(lookup("processing_lots").is_none());
        assert!(lookup("users").is_none());
    }

    #[test]
    fn references_point_at_tenant_scoped_tables() {
        let targets: Vec<_> = RESOURCES
            .iter()
            .flat_map(|r| r.reference_columns().map(move |c| (r.table, c.name, c.references.map(|t| t.table))))
            .collect();
        assert_eq!(targets.len(), 5);
        assert!(targets.contains(&("assets", "shipment_id", Some("shipments"))));
        assert!(targets.contains(&("assets", "processing_lot_id", Some("processing_lots"))));
        assert!(targets.contains(&("shipments", "vendor_id", Some("vendors"))));
        assert!(targets.contains(&("processing_lots", "vendor_id", Some("vendors"))));
        assert!(targets.contains(&("chain_of_custody", "asset_id", Some("assets"))));
    }

    #[test]
    fn custody_events_are_written_through_the_asset_route() {
        assert_eq!(CHAIN_OF_CUSTODY.written_via, Some("/api/assets/:id/custody"));
        assert_eq!(RESOURCES.iter().filter(|r| r.written_via.is_some()).count(), 1);
    }

    #[test]
    fn clients_can_only_write_reverse_requests() {
        let writable: Vec<_> = RESOURCES
            .iter()
            .filter(|r| r.can_write(Role::Client))
            .map(|r| r.name)
            .collect();
        assert_eq!(writable, vec!["reverse-requests"]);
    }
}
