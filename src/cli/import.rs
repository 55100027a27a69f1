use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::backend::SqliteBackend;
use crate::cli::open_db;
use crate::cli::preview::mapping_table;
use crate::cli::ImportArgs;
use crate::error::{ImportError, Result};
use crate::mapper::{guess_mapping, FieldMapping};
use crate::models::{EntityType, Field, ImportJob, ImportReport};
use crate::pipeline::{load_job, run as run_pipeline, ImportOptions};
use crate::settings::load_settings;

const MAX_LISTED_REJECTIONS: usize = 10;

fn parse_field(key: &str) -> Result<Field> {
    Field::from_key(key).ok_or_else(|| ImportError::InvalidMapping(format!("unknown field `{}`", key.trim())))
}

/// Apply `field=Header` overrides, then `--unmap`, on top of the guess.
pub(crate) fn build_mapping(job: &ImportJob, overrides: &[String], unmap: &[String]) -> Result<FieldMapping> {
    let entity = job.entity();
    let mut mapping = guess_mapping(entity, job.headers());
    for item in overrides {
        let (field, header) = item.split_once('=').ok_or_else(|| {
            ImportError::InvalidMapping(format!("expected FIELD=HEADER, got \"{item}\""))
        })?;
        mapping.assign(entity, job.headers(), parse_field(field)?, header.trim())?;
    }
    for key in unmap {
        mapping.unmap(entity, parse_field(key)?)?;
    }
    Ok(mapping)
}

fn print_report(report: &ImportReport) {
    if report.is_success() {
        println!("{}", report.message.green().bold());
    } else {
        println!("{}", "Import failed".red().bold());
        println!("{}", report.message);
    }
    println!(
        "{} total, {} imported, {} rejected",
        report.rows_total, report.rows_imported, report.rows_rejected
    );

    if !report.rejections.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Line", "Reason"]);
        for r in report.rejections.iter().take(MAX_LISTED_REJECTIONS) {
            table.add_row(vec![Cell::new(r.line), Cell::new(&r.reason)]);
        }
        println!("Rejected rows\n{table}");
        let hidden = report.rejections.len().saturating_sub(MAX_LISTED_REJECTIONS);
        if hidden > 0 {
            println!("... and {hidden} more");
        }
    }
}

fn emit(report: &ImportReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_report(report);
    }
    Ok(())
}

fn prepare(args: &ImportArgs) -> std::result::Result<(ImportJob, FieldMapping), (usize, ImportError)> {
    let job = load_job(Path::new(&args.file), args.entity, args.format).map_err(|e| (0, e))?;
    let mapping = build_mapping(&job, &args.map, &args.unmap).map_err(|e| (job.rows().len(), e))?;
    Ok((job, mapping))
}

/// Returns the report so the caller can set the exit status; setup problems
/// that happen before a job exists are reported the same way.
pub fn run(db_path: &Path, args: &ImportArgs) -> Result<ImportReport> {
    let entity: EntityType = args.entity;
    let (job, mapping) = match prepare(args) {
        Ok(prepared) => prepared,
        Err((rows_total, err)) => {
            let report = ImportReport::not_started(entity, rows_total, &err);
            emit(&report, args.json)?;
            return Ok(report);
        }
    };

    if !args.json {
        println!("Mapping for {}\n{}", entity.label(), mapping_table(entity, &mapping));
    }

    let conn = open_db(db_path)?;
    let options = ImportOptions {
        decimal_locale: args.locale.unwrap_or(load_settings().decimal_locale),
        dry_run: args.dry_run,
    };
    let report = run_pipeline(&SqliteBackend::new(&conn), &job, &mapping, &options);
    emit(&report, args.json)?;
    Ok(report)
}
