use std::path::{Path, PathBuf};

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path, DB_FILE};

fn create_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = get_connection(db_path)?;
    init_db(&conn)?;
    Ok(())
}

/// With `--db`, only that file is initialized and settings are left alone.
pub fn run(db: Option<&str>, data_dir: Option<String>) -> Result<()> {
    if let Some(path) = db {
        let db_path = PathBuf::from(path);
        create_db(&db_path)?;
        println!("Initialized database at {}", db_path.display());
        return Ok(());
    }

    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(&dir)?;
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(resolved.join("exports"))?;
    create_db(&resolved.join(DB_FILE))?;

    println!("Initialized sisdental at {}", resolved.display());
    Ok(())
}
