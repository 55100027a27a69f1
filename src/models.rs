use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[value(alias = "patients")]
    Patient,
    #[value(alias = "appointments")]
    Appointment,
    #[value(name = "ledger_entry", alias = "ledger")]
    LedgerEntry,
}

impl EntityType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Appointment => "appointment",
            Self::LedgerEntry => "ledger_entry",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Patient => "patients",
            Self::Appointment => "appointments",
            Self::LedgerEntry => "ledger_entries",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Appointment => "appointment",
            Self::LedgerEntry => "ledger entry",
        }
    }

    /// Whether records of this type must point at an existing patient.
    pub fn references_patient(&self) -> bool {
        !matches!(self, Self::Patient)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Canonical target fields across all entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    TaxId,
    Phone,
    Email,
    BirthDate,
    PatientId,
    Service,
    Date,
    Time,
    Status,
    Notes,
    Description,
    Amount,
    DueDate,
    PaidDate,
}

const ALL_FIELDS: &[Field] = &[
    Field::Name,
    Field::TaxId,
    Field::Phone,
    Field::Email,
    Field::BirthDate,
    Field::PatientId,
    Field::Service,
    Field::Date,
    Field::Time,
    Field::Status,
    Field::Notes,
    Field::Description,
    Field::Amount,
    Field::DueDate,
    Field::PaidDate,
];

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::TaxId => "tax_id",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::BirthDate => "birth_date",
            Self::PatientId => "patient_id",
            Self::Service => "service",
            Self::Date => "date",
            Self::Time => "time",
            Self::Status => "status",
            Self::Notes => "notes",
            Self::Description => "description",
            Self::Amount => "amount",
            Self::DueDate => "due_date",
            Self::PaidDate => "paid_date",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        let key = key.trim();
        ALL_FIELDS.iter().find(|f| f.key() == key).copied()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One data row as decoded, keyed by source header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based line (CSV) or sheet row (workbook) the row came from.
    pub line: usize,
    pub values: HashMap<String, String>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> &str {
        self.values.get(header).map(String::as_str).unwrap_or("")
    }
}

/// Rectangular output of the file decoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// A decoded upload bound to its target entity. Re-uploading creates a new job.
#[derive(Debug, Clone)]
pub struct ImportJob {
    entity: EntityType,
    source_headers: Vec<String>,
    raw_rows: Vec<RawRow>,
}

impl ImportJob {
    pub fn new(entity: EntityType, table: DecodedTable) -> Self {
        Self {
            entity,
            source_headers: table.headers,
            raw_rows: table.rows,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn headers(&self) -> &[String] {
        &self.source_headers
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.raw_rows
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Date(NaiveDate),
    Decimal(Decimal),
    Id(i64),
}

/// A raw row after type coercion. Absent fields are null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub line: usize,
    values: BTreeMap<Field, Value>,
}

impl NormalizedRecord {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, field: Field, value: Option<Value>) {
        match value {
            Some(v) => {
                self.values.insert(field, v);
            }
            None => {
                self.values.remove(&field);
            }
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.values.get(&field) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        match self.values.get(&field) {
            Some(Value::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn decimal(&self, field: Field) -> Option<Decimal> {
        match self.values.get(&field) {
            Some(Value::Decimal(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn id(&self, field: Field) -> Option<i64> {
        match self.values.get(&field) {
            Some(Value::Id(id)) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub service: String,
    pub date: NaiveDate,
    pub time: String,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub patient_id: i64,
    pub description: String,
    pub amount: Decimal,
    pub status: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
}

/// Final write set for one job, always a single entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Patients(Vec<NewPatient>),
    Appointments(Vec<NewAppointment>),
    LedgerEntries(Vec<NewLedgerEntry>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Self::Patients(rows) => rows.len(),
            Self::Appointments(rows) => rows.len(),
            Self::LedgerEntries(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Decoded,
    Mapped,
    Normalized,
    Resolved,
    Built,
    Persisted,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decoded => "decoded",
            Self::Mapped => "mapped",
            Self::Normalized => "normalized",
            Self::Resolved => "resolved",
            Self::Built => "built",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A row left out of the write set, with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Decode,
    UnresolvedReference,
    Lookup,
    Persistence,
    InvalidMapping,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_keys: Vec<String>,
}

impl From<&ImportError> for Failure {
    fn from(err: &ImportError) -> Self {
        let (kind, missing_keys) = match err {
            ImportError::Decode(_) => (FailureKind::Decode, Vec::new()),
            ImportError::UnresolvedReference { missing } => {
                (FailureKind::UnresolvedReference, missing.clone())
            }
            ImportError::Lookup(_) => (FailureKind::Lookup, Vec::new()),
            ImportError::Persistence(_) => (FailureKind::Persistence, Vec::new()),
            ImportError::InvalidMapping(_) => (FailureKind::InvalidMapping, Vec::new()),
            _ => (FailureKind::Internal, Vec::new()),
        };
        Self {
            kind,
            message: err.to_string(),
            missing_keys,
        }
    }
}

/// Terminal artifact of a job. Returned to the caller, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub entity: EntityType,
    pub state: JobState,
    pub rows_total: usize,
    pub rows_imported: usize,
    pub rows_rejected: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    pub rejections: Vec<Rejection>,
}

impl ImportReport {
    /// Report for a job that failed before any stage ran: an unreadable file
    /// or a mapping that cannot be applied.
    pub fn not_started(entity: EntityType, rows_total: usize, err: &ImportError) -> Self {
        Self {
            entity,
            state: JobState::Failed,
            rows_total,
            rows_imported: 0,
            rows_rejected: 0,
            message: err.to_string(),
            error: Some(Failure::from(err)),
            rejections: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
