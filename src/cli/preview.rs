use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::decoder::SourceFormat;
use crate::error::Result;
use crate::mapper::{guess_mapping, FieldMapping};
use crate::models::{EntityType, ImportJob};
use crate::pipeline::load_job;
use crate::schema::fields_for;

pub(crate) fn mapping_table(entity: EntityType, mapping: &FieldMapping) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Required", "Column"]);
    for spec in fields_for(entity) {
        let column = match mapping.header(spec.field) {
            Some(header) => header.to_string(),
            None if spec.required => "(unmapped)".red().to_string(),
            None => "(unmapped)".dimmed().to_string(),
        };
        table.add_row(vec![
            Cell::new(spec.field),
            Cell::new(if spec.required { "yes" } else { "" }),
            Cell::new(column),
        ]);
    }
    table
}

fn sample_table(job: &ImportJob, rows: usize) -> Table {
    let mut table = Table::new();
    let mut header = vec!["Line".to_string()];
    header.extend(job.headers().iter().cloned());
    table.set_header(header);
    for row in job.rows().iter().take(rows) {
        let mut cells = vec![Cell::new(row.line)];
        cells.extend(job.headers().iter().map(|h| Cell::new(row.get(h))));
        table.add_row(cells);
    }
    table
}

pub fn run(file: &str, entity: EntityType, rows: usize, format: Option<SourceFormat>) -> Result<()> {
    let job = load_job(Path::new(file), entity, format)?;
    let mapping = guess_mapping(entity, job.headers());

    println!("{} data row(s), {} column(s)", job.rows().len(), job.headers().len());
    println!();
    println!("Mapping for {}\n{}", entity.label(), mapping_table(entity, &mapping));
    if !job.rows().is_empty() && rows > 0 {
        println!();
        println!("First rows\n{}", sample_table(&job, rows));
    }
    Ok(())
}
