use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::Result;
use crate::models::{NewAppointment, NewLedgerEntry, NewPatient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientKey {
    pub id: i64,
    pub tax_id: String,
}

/// Relational store the import writes through. Every method is a single
/// request covering the whole slice, and a write either applies every row
/// or none of them.
pub trait Backend {
    /// `SELECT id, tax_id FROM patients WHERE tax_id IN (…)`; keys with no
    /// patient are simply absent from the result.
    fn find_patients_by_tax_id(&self, tax_ids: &[String]) -> Result<Vec<PatientKey>>;

    /// Insert or update on conflict of `tax_id`.
    fn upsert_patients(&self, rows: &[NewPatient]) -> Result<usize>;

    fn insert_appointments(&self, rows: &[NewAppointment]) -> Result<usize>;

    fn insert_ledger_entries(&self, rows: &[NewLedgerEntry]) -> Result<usize>;
}

fn iso(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct SqliteBackend<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBackend<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Backend for SqliteBackend<'_> {
    fn find_patients_by_tax_id(&self, tax_ids: &[String]) -> Result<Vec<PatientKey>> {
        // One JSON array parameter keeps the IN-list clear of the bind limit.
        let keys = serde_json::to_string(tax_ids)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, tax_id FROM patients WHERE tax_id IN (SELECT value FROM json_each(?1))",
        )?;
        let rows = stmt
            .query_map([keys], |row| {
                Ok(PatientKey {
                    id: row.get(0)?,
                    tax_id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_patients(&self, rows: &[NewPatient]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO patients (name, tax_id, phone, email, birth_date) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(tax_id) DO UPDATE SET name = excluded.name, phone = excluded.phone, \
                 email = excluded.email, birth_date = excluded.birth_date, updated_at = datetime('now')",
            )?;
            for r in rows {
                stmt.execute(rusqlite::params![r.name, r.tax_id, r.phone, r.email, iso(r.birth_date)])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn insert_appointments(&self, rows: &[NewAppointment]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO appointments (patient_id, service, date, time, status, notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in rows {
                stmt.execute(rusqlite::params![
                    r.patient_id,
                    r.service,
                    iso(Some(r.date)),
                    r.time,
                    r.status,
                    r.notes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn insert_ledger_entries(&self, rows: &[NewLedgerEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ledger_entries (patient_id, description, amount, status, due_date, paid_date) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in rows {
                stmt.execute(rusqlite::params![
                    r.patient_id,
                    r.description,
                    r.amount.to_string(),
                    r.status,
                    iso(r.due_date),
                    iso(r.paid_date),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::error::ImportError;
    use std::io::{Error as IoError, ErrorKind};

    /// In-memory backend that counts calls and can be told to reject writes.
    #[derive(Default)]
    pub struct FakeBackend {
        pub patients: RefCell<Vec<PatientKey>>,
        pub lookups: Cell<usize>,
        pub looked_up: RefCell<Vec<String>>,
        pub written: Cell<usize>,
        pub write_calls: Cell<usize>,
        pub fail_writes: bool,
    }

    impl FakeBackend {
        pub fn with_patients(keys: &[(i64, &str)]) -> Self {
            let backend = Self::default();
            backend.patients.replace(
                keys.iter()
                    .map(|(id, tax_id)| PatientKey {
                        id: *id,
                        tax_id: tax_id.to_string(),
                    })
                    .collect(),
            );
            backend
        }

        fn write(&self, n: usize) -> Result<usize> {
            self.write_calls.set(self.write_calls.get() + 1);
            if self.fail_writes {
                return Err(ImportError::Io(IoError::new(ErrorKind::ConnectionReset, "connection reset")));
            }
            self.written.set(self.written.get() + n);
            Ok(n)
        }
    }

    impl Backend for FakeBackend {
        fn find_patients_by_tax_id(&self, tax_ids: &[String]) -> Result<Vec<PatientKey>> {
            self.lookups.set(self.lookups.get() + 1);
            self.looked_up.borrow_mut().extend(tax_ids.iter().cloned());
            Ok(self
                .patients
                .borrow()
                .iter()
                .filter(|p| tax_ids.contains(&p.tax_id))
                .cloned()
                .collect())
        }

        fn upsert_patients(&self, rows: &[NewPatient]) -> Result<usize> {
            self.write(rows.len())
        }

        fn insert_appointments(&self, rows: &[NewAppointment]) -> Result<usize> {
            self.write(rows.len())
        }

        fn insert_ledger_entries(&self, rows: &[NewLedgerEntry]) -> Result<usize> {
            self.write(rows.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, get_connection, init_db};
    use rust_decimal::Decimal;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn patient(name: &str, tax_id: Option<&str>) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            tax_id: tax_id.map(str::to_string),
            phone: None,
            email: None,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 2),
        }
    }

    fn appointment(patient_id: i64) -> NewAppointment {
        NewAppointment {
            patient_id,
            service: "Limpeza".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            time: "10:00".to_string(),
            status: None,
            notes: None,
        }
    }

    #[test]
    fn test_find_patients_returns_only_existing() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        backend
            .upsert_patients(&[patient("Ana", Some("111")), patient("Bia", Some("222"))])
            .unwrap();
        let keys = vec!["111".to_string(), "999".to_string()];
        let found = backend.find_patients_by_tax_id(&keys).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tax_id, "111");
    }

    #[test]
    fn test_find_patients_handles_large_key_sets() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        let keys: Vec<String> = (0..50_000).map(|i| i.to_string()).collect();
        assert!(backend.find_patients_by_tax_id(&keys).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_updates_instead_of_duplicating() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        backend.upsert_patients(&[patient("Ana", Some("111"))]).unwrap();
        backend.upsert_patients(&[patient("Ana Souza", Some("111"))]).unwrap();
        assert_eq!(count_rows(&conn, "patients").unwrap(), 1);
        let (name, birth): (String, String) = conn
            .query_row("SELECT name, birth_date FROM patients", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(name, "Ana Souza");
        assert_eq!(birth, "1990-01-02");
    }

    #[test]
    fn test_patients_without_tax_id_always_insert() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        backend.upsert_patients(&[patient("Ana", None)]).unwrap();
        backend.upsert_patients(&[patient("Ana", None)]).unwrap();
        assert_eq!(count_rows(&conn, "patients").unwrap(), 2);
    }

    #[test]
    fn test_insert_batch_is_all_or_nothing() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        backend.upsert_patients(&[patient("Ana", Some("111"))]).unwrap();
        let id = conn.last_insert_rowid();
        let res = backend.insert_appointments(&[appointment(id), appointment(id + 100)]);
        assert!(res.is_err());
        assert_eq!(count_rows(&conn, "appointments").unwrap(), 0);
    }

    #[test]
    fn test_ledger_amount_stored_exactly() {
        let (_dir, conn) = test_db();
        let backend = SqliteBackend::new(&conn);
        backend.upsert_patients(&[patient("Ana", Some("111"))]).unwrap();
        let id = conn.last_insert_rowid();
        let entry = NewLedgerEntry {
            patient_id: id,
            description: "Canal".to_string(),
            amount: "1234.56".parse::<Decimal>().unwrap(),
            status: Some("pendente".to_string()),
            due_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            paid_date: None,
        };
        assert_eq!(backend.insert_ledger_entries(&[entry]).unwrap(), 1);
        let (amount, due, paid): (String, String, Option<String>) = conn
            .query_row("SELECT amount, due_date, paid_date FROM ledger_entries", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(amount, "1234.56");
        assert_eq!(due, "2024-04-01");
        assert_eq!(paid, None);
    }
}
