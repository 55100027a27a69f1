use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::cli::open_db;
use crate::error::Result;
use crate::export::write_csv;
use crate::models::EntityType;

pub fn run(db_path: &Path, entity: EntityType, output: Option<&str>) -> Result<()> {
    let conn = open_db(db_path)?;
    match output {
        Some(path) => {
            let count = write_csv(&conn, entity, BufWriter::new(File::create(path)?))?;
            eprintln!("Exported {count} {} row(s) to {path}", entity.label());
        }
        None => {
            write_csv(&conn, entity, std::io::stdout().lock())?;
        }
    }
    Ok(())
}
