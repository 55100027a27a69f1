use std::path::Path;

use crate::db::{count_rows, get_connection};
use crate::error::Result;
use crate::models::EntityType;
use crate::settings::load_settings;

pub fn run(db_path: &Path) -> Result<()> {
    let settings = load_settings();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Locale:     {:?}", settings.decimal_locale);

    if db_path.exists() {
        let conn = get_connection(db_path)?;
        println!();
        for entity in [EntityType::Patient, EntityType::Appointment, EntityType::LedgerEntry] {
            let count = count_rows(&conn, entity.table())?;
            println!("{:<16}{count}", format!("{}:", entity.table()));
        }
    } else {
        println!();
        println!("Database not found. Run `sisdental-import init` to set up.");
    }

    Ok(())
}
