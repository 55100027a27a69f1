//! One import job from decoded table to report.
//!
//! Stages run in order `decoded → mapped → normalized → resolved → built →
//! persisted`. The first fatal error moves the job to `failed` and skips the
//! rest; per-row rejections only shrink the payload.

use std::path::Path;

use log::{debug, info, warn};

use crate::backend::Backend;
use crate::builder::build;
use crate::decoder::{decode_file, SourceFormat};
use crate::error::Result;
use crate::mapper::FieldMapping;
use crate::models::{EntityType, Failure, Field, ImportJob, ImportReport, JobState, Rejection};
use crate::normalizer::{normalize_rows, DecimalLocale};
use crate::persistence::persist;
use crate::resolver::resolve;
use crate::schema::required_fields;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub decimal_locale: DecimalLocale,
    /// Stop after building the payload; nothing is written.
    pub dry_run: bool,
}

/// Decode a file into a job. Read and parse failures surface as
/// [`crate::error::ImportError::Decode`].
pub fn load_job(path: &Path, entity: EntityType, format: Option<SourceFormat>) -> Result<ImportJob> {
    let table = decode_file(path, format)?;
    debug!(
        "Decoded {} header(s) and {} row(s) from {}",
        table.headers.len(),
        table.rows.len(),
        path.display()
    );
    Ok(ImportJob::new(entity, table))
}

struct Progress {
    state: JobState,
    rejections: Vec<Rejection>,
}

impl Progress {
    fn advance(&mut self, next: JobState) {
        debug!("Job {} -> {}", self.state, next);
        self.state = next;
    }
}

fn run_stages<B: Backend + ?Sized>(
    backend: &B,
    job: &ImportJob,
    mapping: &FieldMapping,
    options: &ImportOptions,
    progress: &mut Progress,
) -> Result<usize> {
    let entity = job.entity();

    let normalized = normalize_rows(entity, job.rows(), mapping, options.decimal_locale);
    progress.rejections.extend(normalized.rejections);
    progress.advance(JobState::Normalized);

    let index = resolve(backend, entity, &normalized.candidates, mapping)?;
    progress.advance(JobState::Resolved);

    let built = build(entity, &normalized.candidates, index.as_ref());
    progress.rejections.extend(built.rejections);
    progress.advance(JobState::Built);

    if options.dry_run {
        return Ok(built.payload.len());
    }

    let written = persist(backend, &built.payload)?;
    progress.advance(JobState::Persisted);
    Ok(written)
}

fn success_message(entity: EntityType, total: usize, imported: usize, rejected: usize, dry_run: bool) -> String {
    if total == 0 {
        return "No rows to import.".to_string();
    }
    let verb = if dry_run { "would be imported" } else { "imported" };
    let mut message = format!("{imported} of {total} {} row(s) {verb}", entity.label());
    if rejected > 0 {
        message.push_str(&format!(" ({rejected} rejected)"));
    }
    message.push('.');
    if dry_run {
        message.insert_str(0, "Dry run: ");
    }
    message
}

/// Run every stage after decoding. Fatal errors end up in the report rather
/// than the return value, so the caller always has counts to show.
pub fn run<B: Backend + ?Sized>(
    backend: &B,
    job: &ImportJob,
    mapping: &FieldMapping,
    options: &ImportOptions,
) -> ImportReport {
    let entity = job.entity();
    let rows_total = job.rows().len();
    info!("Importing {rows_total} {} row(s)", entity.label());
    for (field, header) in mapping.iter() {
        debug!("{field} <- \"{header}\"");
    }
    for field in required_fields(entity).filter(|f| !mapping.is_mapped(*f)) {
        warn!("Required field `{field}` is not mapped; every row will be rejected");
    }
    if entity.references_patient()
        && !mapping.is_mapped(Field::PatientId)
        && !mapping.is_mapped(Field::TaxId)
    {
        warn!("Neither patient_id nor tax_id is mapped; every row will be rejected");
    }

    let mut progress = Progress {
        state: JobState::Decoded,
        rejections: Vec::new(),
    };
    progress.advance(JobState::Mapped);
    let outcome = run_stages(backend, job, mapping, options, &mut progress);
    let rows_rejected = progress.rejections.len();

    match outcome {
        Ok(imported) => {
            let message = success_message(entity, rows_total, imported, rows_rejected, options.dry_run);
            info!("{message}");
            ImportReport {
                entity,
                state: progress.state,
                rows_total,
                rows_imported: imported,
                rows_rejected,
                message,
                error: None,
                rejections: progress.rejections,
            }
        }
        Err(err) => {
            warn!("Import failed after {}: {err}", progress.state);
            ImportReport {
                entity,
                state: JobState::Failed,
                rows_total,
                rows_imported: 0,
                rows_rejected,
                message: err.to_string(),
                error: Some(Failure::from(&err)),
                rejections: progress.rejections,
            }
        }
    }
}
