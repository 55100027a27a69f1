use log::debug;

use crate::models::{
    EntityType, Field, NewAppointment, NewLedgerEntry, NewPatient, NormalizedRecord, Payload,
    Rejection,
};
use crate::resolver::ReferenceIndex;

const UNKNOWN_PATIENT: &str = "patient could not be determined";

pub struct Built {
    pub payload: Payload,
    pub rejections: Vec<Rejection>,
}

fn missing(field: Field) -> String {
    format!("missing required field `{field}`")
}

fn required_text(rec: &NormalizedRecord, field: Field) -> Result<String, String> {
    rec.text(field).map(str::to_string).ok_or_else(|| missing(field))
}

fn optional_text(rec: &NormalizedRecord, field: Field) -> Option<String> {
    rec.text(field).map(str::to_string)
}

/// Direct identifier first, then the tax id through the index.
fn patient_id(rec: &NormalizedRecord, index: Option<&ReferenceIndex>) -> Result<i64, String> {
    rec.id(Field::PatientId)
        .or_else(|| index.and_then(|idx| rec.text(Field::TaxId).and_then(|t| idx.get(t))))
        .ok_or_else(|| UNKNOWN_PATIENT.to_string())
}

fn patient(rec: &NormalizedRecord) -> Result<NewPatient, String> {
    Ok(NewPatient {
        name: required_text(rec, Field::Name)?,
        tax_id: optional_text(rec, Field::TaxId),
        phone: optional_text(rec, Field::Phone),
        email: optional_text(rec, Field::Email),
        birth_date: rec.date(Field::BirthDate),
    })
}

fn appointment(rec: &NormalizedRecord, index: Option<&ReferenceIndex>) -> Result<NewAppointment, String> {
    Ok(NewAppointment {
        patient_id: patient_id(rec, index)?,
        service: required_text(rec, Field::Service)?,
        date: rec.date(Field::Date).ok_or_else(|| missing(Field::Date))?,
        time: required_text(rec, Field::Time)?,
        status: optional_text(rec, Field::Status),
        notes: optional_text(rec, Field::Notes),
    })
}

fn ledger_entry(rec: &NormalizedRecord, index: Option<&ReferenceIndex>) -> Result<NewLedgerEntry, String> {
    Ok(NewLedgerEntry {
        patient_id: patient_id(rec, index)?,
        description: required_text(rec, Field::Description)?,
        amount: rec.decimal(Field::Amount).ok_or_else(|| missing(Field::Amount))?,
        status: optional_text(rec, Field::Status),
        due_date: rec.date(Field::DueDate),
        paid_date: rec.date(Field::PaidDate),
    })
}

fn collect<T, F>(candidates: &[NormalizedRecord], rejections: &mut Vec<Rejection>, make: F) -> Vec<T>
where
    F: Fn(&NormalizedRecord) -> Result<T, String>,
{
    let mut out = Vec::with_capacity(candidates.len());
    for rec in candidates {
        match make(rec) {
            Ok(row) => out.push(row),
            Err(reason) => {
                debug!("Line {} rejected: {reason}", rec.line);
                rejections.push(Rejection {
                    line: rec.line,
                    reason,
                });
            }
        }
    }
    out
}

/// Turn candidates into typed write rows. Rows whose patient cannot be
/// determined are rejected here, never written with a null reference.
pub fn build(
    entity: EntityType,
    candidates: &[NormalizedRecord],
    index: Option<&ReferenceIndex>,
) -> Built {
    let mut rejections = Vec::new();
    let payload = match entity {
        EntityType::Patient => Payload::Patients(collect(candidates, &mut rejections, patient)),
        EntityType::Appointment => Payload::Appointments(collect(candidates, &mut rejections, |r| {
            appointment(r, index)
        })),
        EntityType::LedgerEntry => Payload::LedgerEntries(collect(candidates, &mut rejections, |r| {
            ledger_entry(r, index)
        })),
    };
    Built {
        payload,
        rejections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::mapper::guess_mapping;
    use crate::models::{RawRow, Value};
    use crate::normalizer::{normalize_rows, DecimalLocale};
    use crate::resolver::resolve;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn raw(line: usize, pairs: &[(&str, &str)]) -> RawRow {
        RawRow {
            line,
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn candidates(entity: EntityType, headers: &[&str], rows: &[RawRow]) -> (Vec<NormalizedRecord>, crate::mapper::FieldMapping) {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        let mapping = guess_mapping(entity, &headers);
        let out = normalize_rows(entity, rows, &mapping, DecimalLocale::Auto);
        assert!(out.rejections.is_empty());
        (out.candidates, mapping)
    }

    #[test]
    fn test_patient_payload() {
        let (cands, _) = candidates(
            EntityType::Patient,
            &["Nome", "CPF", "Nascimento"],
            &[raw(2, &[("Nome", "Ana"), ("CPF", "111"), ("Nascimento", "02/01/1990")])],
        );
        let built = build(EntityType::Patient, &cands, None);
        let Payload::Patients(rows) = built.payload else { panic!("wrong payload") };
        assert_eq!(rows[0].name, "Ana");
        assert_eq!(rows[0].tax_id.as_deref(), Some("111"));
        assert_eq!(rows[0].birth_date, NaiveDate::from_ymd_opt(1990, 1, 2));
        assert!(built.rejections.is_empty());
    }

    #[test]
    fn test_tax_id_replaced_by_resolved_id() {
        let backend = FakeBackend::with_patients(&[(7, "111")]);
        let (cands, mapping) = candidates(
            EntityType::LedgerEntry,
            &["CPF", "Descricao", "Valor"],
            &[raw(2, &[("CPF", "111"), ("Descricao", "Canal"), ("Valor", "R$ 1.234,56")])],
        );
        let index = resolve(&backend, EntityType::LedgerEntry, &cands, &mapping).unwrap();
        let built = build(EntityType::LedgerEntry, &cands, index.as_ref());
        let Payload::LedgerEntries(rows) = built.payload else { panic!("wrong payload") };
        assert_eq!(rows[0].patient_id, 7);
        assert_eq!(rows[0].amount, "1234.56".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_blank_direct_identifier_rejects_row_only() {
        let (cands, _) = candidates(
            EntityType::Appointment,
            &["paciente_id", "Servico", "Data", "Hora"],
            &[
                raw(2, &[("paciente_id", "3"), ("Servico", "Limpeza"), ("Data", "2024-03-05"), ("Hora", "10:00")]),
                raw(3, &[("paciente_id", ""), ("Servico", "Canal"), ("Data", "2024-03-06"), ("Hora", "11:00")]),
            ],
        );
        let built = build(EntityType::Appointment, &cands, None);
        assert_eq!(built.payload.len(), 1);
        assert_eq!(built.rejections, vec![Rejection { line: 3, reason: UNKNOWN_PATIENT.to_string() }]);
    }

    #[test]
    fn test_no_patient_columns_rejects_everything() {
        let (cands, _) = candidates(
            EntityType::LedgerEntry,
            &["Descricao", "Valor"],
            &[raw(2, &[("Descricao", "Canal"), ("Valor", "10")])],
        );
        let built = build(EntityType::LedgerEntry, &cands, None);
        assert!(built.payload.is_empty());
        assert_eq!(built.rejections.len(), 1);
    }

    #[test]
    fn test_record_missing_required_value_is_rejected() {
        let mut rec = NormalizedRecord::new(9);
        rec.set(Field::PatientId, Some(Value::Id(1)));
        rec.set(Field::Service, Some(Value::Text("Limpeza".into())));
        rec.set(Field::Time, Some(Value::Text("10:00".into())));
        let built = build(EntityType::Appointment, &[rec], None);
        assert!(built.payload.is_empty());
        assert_eq!(built.rejections[0].line, 9);
        assert!(built.rejections[0].reason.contains("date"));
    }
}
