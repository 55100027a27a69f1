//! Canonical field table per entity type.
//!
//! Each entry fixes the coercion rule for a field, whether a row without it
//! is dropped, and the normalized header keys that map onto it (in priority
//! order). Header keys are stored already normalized, see
//! [`crate::mapper::normalize_header`].

use crate::models::{EntityType, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Decimal,
    Identifier,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub kind: FieldKind,
    pub required: bool,
    pub header_keys: &'static [&'static str],
}

const fn spec(
    field: Field,
    kind: FieldKind,
    required: bool,
    header_keys: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        field,
        kind,
        required,
        header_keys,
    }
}

const PATIENT_FIELDS: &[FieldSpec] = &[
    spec(Field::Name, FieldKind::Text, true, &["nome", "name", "nome_completo", "paciente", "patient"]),
    spec(Field::TaxId, FieldKind::Text, false, &["cpf", "tax_id", "documento"]),
    spec(Field::Phone, FieldKind::Text, false, &["telefone", "phone", "celular", "fone", "whatsapp"]),
    spec(Field::Email, FieldKind::Text, false, &["email", "e-mail", "e_mail"]),
    spec(
        Field::BirthDate,
        FieldKind::Date,
        false,
        &["data_nascimento", "nascimento", "data_de_nascimento", "birthdate", "birth_date", "date_of_birth", "dob"],
    ),
];

const APPOINTMENT_FIELDS: &[FieldSpec] = &[
    spec(Field::PatientId, FieldKind::Identifier, false, &["paciente_id", "id_paciente", "patient_id"]),
    spec(Field::TaxId, FieldKind::Text, false, &["cpf", "cpf_paciente", "tax_id"]),
    spec(Field::Service, FieldKind::Text, true, &["servico", "procedimento", "service"]),
    spec(Field::Date, FieldKind::Date, true, &["data", "data_consulta", "date"]),
    spec(Field::Time, FieldKind::Text, true, &["hora", "horario", "time"]),
    spec(Field::Status, FieldKind::Text, false, &["status", "situacao"]),
    spec(Field::Notes, FieldKind::Text, false, &["observacoes", "observacao", "obs", "notes"]),
];

const LEDGER_FIELDS: &[FieldSpec] = &[
    spec(Field::PatientId, FieldKind::Identifier, false, &["paciente_id", "id_paciente", "patient_id"]),
    spec(Field::TaxId, FieldKind::Text, false, &["cpf", "cpf_paciente", "tax_id"]),
    spec(Field::Description, FieldKind::Text, true, &["descricao", "description", "historico"]),
    spec(Field::Amount, FieldKind::Decimal, true, &["valor", "valor_r$", "preco", "amount", "price"]),
    spec(Field::Status, FieldKind::Text, false, &["status", "situacao"]),
    spec(Field::DueDate, FieldKind::Date, false, &["data_vencimento", "vencimento", "due_date"]),
    spec(Field::PaidDate, FieldKind::Date, false, &["data_pagamento", "pagamento", "paid_date"]),
];

pub fn fields_for(entity: EntityType) -> &'static [FieldSpec] {
    match entity {
        EntityType::Patient => PATIENT_FIELDS,
        EntityType::Appointment => APPOINTMENT_FIELDS,
        EntityType::LedgerEntry => LEDGER_FIELDS,
    }
}

pub fn spec_for(entity: EntityType, field: Field) -> Option<&'static FieldSpec> {
    fields_for(entity).iter().find(|s| s.field == field)
}

pub fn required_fields(entity: EntityType) -> impl Iterator<Item = Field> {
    fields_for(entity)
        .iter()
        .filter(|s| s.required)
        .map(|s| s.field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::normalize_header;

    const ALL: [EntityType; 3] = [
        EntityType::Patient,
        EntityType::Appointment,
        EntityType::LedgerEntry,
    ];

    #[test]
    fn test_header_keys_are_stored_normalized() {
        for entity in ALL {
            for spec in fields_for(entity) {
                for key in spec.header_keys {
                    assert_eq!(&normalize_header(key), key, "{entity}.{} key {key}", spec.field);
                }
            }
        }
    }

    #[test]
    fn test_required_fields_per_entity() {
        let patient: Vec<_> = required_fields(EntityType::Patient).collect();
        assert_eq!(patient, vec![Field::Name]);
        let appt: Vec<_> = required_fields(EntityType::Appointment).collect();
        assert_eq!(appt, vec![Field::Service, Field::Date, Field::Time]);
        let ledger: Vec<_> = required_fields(EntityType::LedgerEntry).collect();
        assert_eq!(ledger, vec![Field::Description, Field::Amount]);
    }

    #[test]
    fn test_referencing_entities_offer_both_keys() {
        for entity in [EntityType::Appointment, EntityType::LedgerEntry] {
            assert!(spec_for(entity, Field::PatientId).is_some());
            assert!(spec_for(entity, Field::TaxId).is_some());
        }
        assert!(spec_for(EntityType::Patient, Field::PatientId).is_none());
    }

    #[test]
    fn test_header_keys_do_not_collide_within_entity() {
        for entity in ALL {
            let mut seen = std::collections::HashSet::new();
            for spec in fields_for(entity) {
                for key in spec.header_keys {
                    assert!(seen.insert(*key), "duplicate key {key} in {entity}");
                }
            }
        }
    }
}
