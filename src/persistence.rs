use log::info;

use crate::backend::Backend;
use crate::error::{ImportError, Result};
use crate::models::Payload;

/// Write the payload in one bulk call: upsert on tax id for patients, plain
/// insert for appointments and ledger entries (re-running those duplicates
/// them, they carry no natural key). Any backend error rejects the batch.
pub fn persist<B: Backend + ?Sized>(backend: &B, payload: &Payload) -> Result<usize> {
    if payload.is_empty() {
        return Ok(0);
    }
    let written = match payload {
        Payload::Patients(rows) => backend.upsert_patients(rows),
        Payload::Appointments(rows) => backend.insert_appointments(rows),
        Payload::LedgerEntries(rows) => backend.insert_ledger_entries(rows),
    }
    .map_err(|e| ImportError::Persistence(e.to_string()))?;
    info!("Wrote {written} row(s)");
    Ok(written)
}
