use std::collections::BTreeMap;

use crate::error::{ImportError, Result};
use crate::models::{EntityType, Field};
use crate::schema::{fields_for, spec_for};

/// Fold accented Latin letters onto their ASCII base letter.
fn fold_accent(c: char) -> char {
    match c {
        'À'..='Å' | 'à'..='å' | 'Ā' | 'ā' | 'Ă' | 'ă' | 'Ą' | 'ą' => 'a',
        'Ç' | 'ç' | 'Ć' | 'ć' | 'Č' | 'č' => 'c',
        'È'..='Ë' | 'è'..='ë' | 'Ē' | 'ē' | 'Ę' | 'ę' | 'Ě' | 'ě' => 'e',
        'Ì'..='Ï' | 'ì'..='ï' | 'Ī' | 'ī' | 'Į' | 'į' => 'i',
        'Ñ' | 'ñ' | 'Ń' | 'ń' | 'Ň' | 'ň' => 'n',
        'Ò'..='Ö' | 'ò'..='ö' | 'Ø' | 'ø' | 'Ō' | 'ō' | 'Ő' | 'ő' => 'o',
        'Ù'..='Ü' | 'ù'..='ü' | 'Ū' | 'ū' | 'Ů' | 'ů' | 'Ű' | 'ű' => 'u',
        'Ý' | 'ý' | 'ÿ' => 'y',
        'Ś' | 'ś' | 'Š' | 'š' => 's',
        'Ź' | 'ź' | 'Ż' | 'ż' | 'Ž' | 'ž' => 'z',
        _ => c,
    }
}

/// Comparison key for a header: trimmed, accents stripped, lowercased, inner
/// whitespace runs collapsed to a single underscore.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .chars()
        .map(fold_accent)
        .flat_map(char::to_lowercase)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join("_")
}

fn check_field(entity: EntityType, field: Field) -> Result<()> {
    if spec_for(entity, field).is_none() {
        return Err(ImportError::InvalidMapping(format!(
            "field `{field}` does not exist for {}",
            entity.label()
        )));
    }
    Ok(())
}

/// Canonical field → source header. A field missing from the map is unmapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    columns: BTreeMap<Field, String>,
}

impl FieldMapping {
    pub fn header(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn is_mapped(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.columns.iter().map(|(f, h)| (*f, h.as_str()))
    }

    /// Point `field` at `header`, replacing any earlier choice. The header may
    /// be given verbatim or in any spelling that normalizes to the same key.
    pub fn assign(
        &mut self,
        entity: EntityType,
        headers: &[String],
        field: Field,
        header: &str,
    ) -> Result<()> {
        check_field(entity, field)?;
        let wanted = normalize_header(header);
        let found = headers
            .iter()
            .find(|h| h.as_str() == header)
            .or_else(|| headers.iter().find(|h| normalize_header(h) == wanted))
            .ok_or_else(|| {
                ImportError::InvalidMapping(format!("no column named \"{header}\" in the file"))
            })?;
        self.columns.insert(field, found.clone());
        Ok(())
    }

    pub fn unmap(&mut self, entity: EntityType, field: Field) -> Result<()> {
        check_field(entity, field)?;
        self.columns.remove(&field);
        Ok(())
    }
}

/// Propose a mapping from the static header table. Candidate keys are tried
/// in table order, so the result does not depend on column order; when two
/// headers normalize to the same key the leftmost wins.
pub fn guess_mapping(entity: EntityType, headers: &[String]) -> FieldMapping {
    let keyed: Vec<(String, &String)> = headers
        .iter()
        .map(|h| (normalize_header(h), h))
        .collect();

    let mut mapping = FieldMapping::default();
    for spec in fields_for(entity) {
        let hit = spec
            .header_keys
            .iter()
            .find_map(|key| keyed.iter().find(|(k, _)| k == key).map(|(_, h)| *h));
        if let Some(header) = hit {
            mapping.columns.insert(spec.field, header.clone());
        }
    }
    mapping
}
