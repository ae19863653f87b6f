//! Database schema definitions using sea-query.
//!
//! Table and column identifiers for query building, plus the DDL run at
//! startup. Timestamps are RFC 3339 TEXT in UTC with microsecond precision
//! so that lexical order equals time order. List and map fields are JSON TEXT.
//! Columns ending in `_lc` hold Unicode-lowercased copies of searchable text.

use sea_query::Iden;

/// Client intakes table schema.
#[derive(Iden, Clone, Copy)]
pub enum ClientIntakes {
    Table,
    Id,
    LegalName,
    TradeName,
    #[iden = "client_type"]
    ClientType,
    OwnerName,
    Address,
    City,
    State,
    ZipCode,
    Country,
    Phone,
    Mobile,
    Email,
    Website,
    Industry,
    Priority,
    Tin,
    RamisStatus,
    ServicesSelected,
    DirectTaxSubcategories,
    IndirectTaxSubcategories,
    TaxTypes,
    IncomeTaxTypes,
    TaxSubSelections,
    TaxReturnYears,
    CompanySecretary,
    RegistrationNumber,
    IncorporationDate,
    AnnualRevenue,
    EmployeeCount,
    CertificateOfIncorporationProvided,
    TinCertificateProvided,
    MemorandumProvided,
    IdDocumentProvided,
    #[iden = "other_document1"]
    OtherDocument1,
    #[iden = "other_document2"]
    OtherDocument2,
    CreditLimit,
    PaymentTerms,
    Currency,
    Notes,
    Consent,
    CreatedBy,
    UpdatedBy,
    SubmittedAt,
    CreatedAt,
    UpdatedAt,
    DeletedBy,
    DeletedAt,
    Version,
    LegalNameLc,
    EmailLc,
    OwnerNameLc,
}

/// Related parties table schema.
#[derive(Iden, Clone, Copy)]
pub enum RelatedParties {
    Table,
    Id,
    ClientIntakeId,
    Position,
    Name,
    Relationship,
    Tin,
    Email,
    Phone,
    CreatedAt,
}

/// Audit logs table schema.
#[derive(Iden, Clone, Copy)]
pub enum AuditLogs {
    Table,
    Id,
    Action,
    EntityType,
    EntityId,
    OldValues,
    NewValues,
    UserId,
    ClientIntakeId,
    IpAddress,
    UserAgent,
    Timestamp,
}

/// Users table schema.
#[derive(Iden, Clone, Copy)]
pub enum Users {
    Table,
    Id,
    Username,
    DisplayName,
    Role,
    PasswordHash,
    StaffId,
    CreatedAt,
}

/// Departments table schema.
#[derive(Iden, Clone, Copy)]
pub enum Departments {
    Table,
    Id,
    Name,
    Description,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// Roles table schema.
#[derive(Iden, Clone, Copy)]
pub enum Roles {
    Table,
    Id,
    Name,
    Description,
    CreatedAt,
}

/// Staff table schema.
#[derive(Iden, Clone, Copy)]
pub enum StaffMembers {
    #[iden = "staff"]
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    Phone,
    Position,
    DepartmentId,
    HireDate,
    IsActive,
    CreatedAt,
    UpdatedAt,
    FirstNameLc,
    LastNameLc,
    EmailLc,
}

/// Staff/role join table schema.
#[derive(Iden, Clone, Copy)]
pub enum StaffRoles {
    Table,
    StaffId,
    RoleId,
    AssignedAt,
}

pub const CREATE_CLIENT_INTAKES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS client_intakes (
    id TEXT PRIMARY KEY,
    legal_name TEXT NOT NULL,
    trade_name TEXT,
    client_type TEXT NOT NULL,
    owner_name TEXT NOT NULL,
    address TEXT NOT NULL,
    city TEXT,
    state TEXT,
    zip_code TEXT,
    country TEXT,
    phone TEXT,
    mobile TEXT,
    email TEXT,
    website TEXT,
    industry TEXT,
    priority TEXT NOT NULL DEFAULT 'MEDIUM',
    tin TEXT,
    ramis_status TEXT NOT NULL,
    services_selected TEXT NOT NULL DEFAULT '[]',
    direct_tax_subcategories TEXT NOT NULL DEFAULT '[]',
    indirect_tax_subcategories TEXT NOT NULL DEFAULT '[]',
    tax_types TEXT NOT NULL DEFAULT '[]',
    income_tax_types TEXT NOT NULL DEFAULT '[]',
    tax_sub_selections TEXT NOT NULL DEFAULT '{}',
    tax_return_years TEXT NOT NULL DEFAULT '{}',
    company_secretary TEXT,
    registration_number TEXT,
    incorporation_date TEXT,
    annual_revenue REAL,
    employee_count INTEGER,
    certificate_of_incorporation_provided INTEGER NOT NULL DEFAULT 0,
    tin_certificate_provided INTEGER NOT NULL DEFAULT 0,
    memorandum_provided INTEGER NOT NULL DEFAULT 0,
    id_document_provided INTEGER NOT NULL DEFAULT 0,
    other_document1 TEXT,
    other_document2 TEXT,
    credit_limit REAL,
    payment_terms TEXT,
    currency TEXT,
    notes TEXT,
    consent INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    updated_by TEXT,
    submitted_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_by TEXT,
    deleted_at TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    legal_name_lc TEXT NOT NULL,
    email_lc TEXT,
    owner_name_lc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_client_intakes_deleted_created
    ON client_intakes(deleted_at, created_at);
"#;

pub const CREATE_RELATED_PARTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS related_parties (
    id TEXT PRIMARY KEY,
    client_intake_id TEXT NOT NULL REFERENCES client_intakes(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    relationship TEXT,
    tin TEXT,
    email TEXT,
    phone TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_related_parties_intake
    ON related_parties(client_intake_id, position);
"#;

pub const CREATE_DEPARTMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const CREATE_ROLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL
);
"#;

pub const CREATE_STAFF_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS staff (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    position TEXT,
    department_id TEXT NOT NULL REFERENCES departments(id),
    hire_date TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    first_name_lc TEXT NOT NULL,
    last_name_lc TEXT NOT NULL,
    email_lc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staff_department ON staff(department_id);
"#;

pub const CREATE_STAFF_ROLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS staff_roles (
    staff_id TEXT NOT NULL REFERENCES staff(id) ON DELETE CASCADE,
    role_id TEXT NOT NULL REFERENCES roles(id),
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (staff_id, role_id)
);

CREATE INDEX IF NOT EXISTS idx_staff_roles_role ON staff_roles(role_id);
"#;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    staff_id TEXT UNIQUE REFERENCES staff(id),
    created_at TEXT NOT NULL
);
"#;

pub const CREATE_AUDIT_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    old_values TEXT,
    new_values TEXT,
    user_id TEXT,
    client_intake_id TEXT,
    ip_address TEXT,
    user_agent TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs(entity_type, entity_id);
"#;

/// DDL in dependency order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_CLIENT_INTAKES_TABLE,
    CREATE_RELATED_PARTIES_TABLE,
    CREATE_DEPARTMENTS_TABLE,
    CREATE_ROLES_TABLE,
    CREATE_STAFF_TABLE,
    CREATE_STAFF_ROLES_TABLE,
    CREATE_USERS_TABLE,
    CREATE_AUDIT_LOGS_TABLE,
];
