//! CSV export in the same column vocabulary the importer recognises, so an
//! exported file can be fed straight back into `import`.

use std::io::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::info;
use rusqlite::Connection;

use crate::error::Result;
use crate::models::{EntityType, Field};

fn columns(entity: EntityType) -> &'static [Field] {
    match entity {
        EntityType::Patient => &[Field::Name, Field::TaxId, Field::Phone, Field::Email, Field::BirthDate],
        EntityType::Appointment => &[
            Field::PatientId,
            Field::TaxId,
            Field::Service,
            Field::Date,
            Field::Time,
            Field::Status,
            Field::Notes,
        ],
        EntityType::LedgerEntry => &[
            Field::PatientId,
            Field::TaxId,
            Field::Description,
            Field::Amount,
            Field::Status,
            Field::DueDate,
            Field::PaidDate,
        ],
    }
}

// Every column comes back as TEXT so rows read uniformly as Option<String>.
fn query(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Patient => {
            "SELECT name, tax_id, phone, email, birth_date FROM patients ORDER BY name, id"
        }
        EntityType::Appointment => {
            "SELECT CAST(a.patient_id AS TEXT), p.tax_id, a.service, a.date, a.time, a.status, a.notes \
             FROM appointments a JOIN patients p ON p.id = a.patient_id \
             ORDER BY a.date, a.time, a.id"
        }
        EntityType::LedgerEntry => {
            "SELECT CAST(l.patient_id AS TEXT), p.tax_id, l.description, l.amount, l.status, l.due_date, l.paid_date \
             FROM ledger_entries l JOIN patients p ON p.id = l.patient_id \
             ORDER BY l.id"
        }
    }
}

/// Write every stored row of `entity` as CSV: all values quoted, CRLF line
/// endings, NULL as an empty field. Returns the number of data rows.
pub fn write_csv<W: Write>(conn: &Connection, entity: EntityType, out: W) -> Result<usize> {
    let cols = columns(entity);
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(out);
    writer.write_record(cols.iter().map(Field::key))?;

    let mut stmt = conn.prepare(query(entity))?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(cols.len());
        for i in 0..cols.len() {
            let value: Option<String> = row.get(i)?;
            record.push(value.unwrap_or_default());
        }
        writer.write_record(&record)?;
        count += 1;
    }
    writer.flush()?;
    info!("Exported {count} {} row(s)", entity.label());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use crate::db::{count_rows, get_connection, init_db};
    use crate::decoder::{decode, SourceFormat};
    use crate::mapper::guess_mapping;
    use crate::models::ImportJob;
    use crate::pipeline::{run, ImportOptions};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn import(conn: &Connection, entity: EntityType, bytes: &[u8]) {
        let job = ImportJob::new(entity, decode(bytes, SourceFormat::Delimited).unwrap());
        let mapping = guess_mapping(entity, job.headers());
        let report = run(&SqliteBackend::new(conn), &job, &mapping, &ImportOptions::default());
        assert!(report.is_success(), "{}", report.message);
    }

    fn export(conn: &Connection, entity: EntityType) -> String {
        let mut buf = Vec::new();
        write_csv(conn, entity, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_quotes_everything_and_uses_crlf() {
        let (_dir, conn) = test_db();
        import(&conn, EntityType::Patient, b"Nome,CPF,Email\nZe,2,\nAna,1,ana@x.com\n");
        let out = export(&conn, EntityType::Patient);
        assert_eq!(
            out,
            "\"name\",\"tax_id\",\"phone\",\"email\",\"birth_date\"\r\n\
             \"Ana\",\"1\",\"\",\"ana@x.com\",\"\"\r\n\
             \"Ze\",\"2\",\"\",\"\",\"\"\r\n"
        );
    }

    #[test]
    fn test_patient_roundtrip_is_idempotent() {
        let (_dir, conn) = test_db();
        import(
            &conn,
            EntityType::Patient,
            "Nome;CPF;Telefone;Nascimento\nAna Souza;111.222.333-44;(11) 9999-0000;02/01/1990\nBia;555;;\n".as_bytes(),
        );
        let first = export(&conn, EntityType::Patient);
        import(&conn, EntityType::Patient, first.as_bytes());
        assert_eq!(count_rows(&conn, "patients").unwrap(), 2);
        assert_eq!(export(&conn, EntityType::Patient), first);
    }

    #[test]
    fn test_ledger_export_keeps_exact_amounts() {
        let (_dir, conn) = test_db();
        import(&conn, EntityType::Patient, b"nome,cpf\nAna,111\n");
        import(
            &conn,
            EntityType::LedgerEntry,
            "cpf;descricao;valor;vencimento\n111;Canal;R$ 1.234,56;2024-04-01\n111;Limpeza;150;\n".as_bytes(),
        );
        let out = export(&conn, EntityType::LedgerEntry);
        let lines: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(
            lines[0],
            "\"patient_id\",\"tax_id\",\"description\",\"amount\",\"status\",\"due_date\",\"paid_date\""
        );
        assert_eq!(lines[1], "\"1\",\"111\",\"Canal\",\"1234.56\",\"\",\"2024-04-01\",\"\"");
        assert_eq!(lines[2], "\"1\",\"111\",\"Limpeza\",\"150\",\"\",\"\",\"\"");
    }

    #[test]
    fn test_appointments_ordered_by_date_then_time() {
        let (_dir, conn) = test_db();
        import(&conn, EntityType::Patient, b"nome,cpf\nAna,111\n");
        import(
            &conn,
            EntityType::Appointment,
            b"cpf,servico,data,hora\n111,B,2024-03-06,09:00\n111,C,2024-03-05,14:00\n111,A,2024-03-05,08:30\n",
        );
        let out = export(&conn, EntityType::Appointment);
        let services: Vec<String> = csv::Reader::from_reader(out.as_bytes())
            .records()
            .map(|r| r.unwrap()[2].to_string())
            .collect();
        assert_eq!(services, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_empty_table_writes_header_only() {
        let (_dir, conn) = test_db();
        let mut buf = Vec::new();
        assert_eq!(write_csv(&conn, EntityType::Appointment, &mut buf).unwrap(), 0);
        assert_eq!(String::from_utf8(buf).unwrap().matches("\r\n").count(), 1);
    }
}
