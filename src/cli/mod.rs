pub mod export;
pub mod import;
pub mod init;
pub mod preview;
pub mod status;

use std::path::Path;

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::decoder::SourceFormat;
use crate::error::{ImportError, Result};
use crate::models::EntityType;
use crate::normalizer::DecimalLocale;

/// Open an existing database; commands other than `init` never create one.
pub(crate) fn open_db(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(ImportError::Settings(format!(
            "No database found at {}\nRun `sisdental-import init` to create one.",
            db_path.display()
        )));
    }
    get_connection(db_path)
}

#[derive(Parser)]
#[command(
    name = "sisdental-import",
    about = "Bulk import of patients, appointments and ledger entries from CSV/XLSX."
)]
pub struct Cli {
    /// Database file to use instead of the one in the configured data directory
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for clinic data (default: ~/Documents/sisdental)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Show the proposed column mapping and the first rows of a file.
    Preview {
        /// Path to CSV or XLSX file
        file: String,
        /// Target record type
        #[arg(long)]
        entity: EntityType,
        /// Number of data rows to show
        #[arg(long, default_value = "5")]
        rows: usize,
        /// Force the file format instead of guessing from the extension
        #[arg(long)]
        format: Option<SourceFormat>,
    },
    /// Import a CSV/XLSX file into the database.
    Import(ImportArgs),
    /// Export stored records as CSV.
    Export {
        /// Record type to export
        entity: EntityType,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<String>,
    },
    /// Show current database and row counts.
    Status,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Path to CSV or XLSX file to import
    pub file: String,
    /// Target record type
    #[arg(long)]
    pub entity: EntityType,
    /// Override the guessed mapping, e.g. `--map tax_id="Documento do paciente"`
    #[arg(long = "map", value_name = "FIELD=HEADER")]
    pub map: Vec<String>,
    /// Leave a field unmapped even if a header matches it
    #[arg(long = "unmap", value_name = "FIELD")]
    pub unmap: Vec<String>,
    /// How to read `,` and `.` in amounts (default: from settings)
    #[arg(long)]
    pub locale: Option<DecimalLocale>,
    /// Force the file format instead of guessing from the extension
    #[arg(long)]
    pub format: Option<SourceFormat>,
    /// Run every stage except the write
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_with_overrides() {
        let cli = Cli::try_parse_from([
            "sisdental-import",
            "import",
            "pacientes.csv",
            "--entity",
            "patients",
            "--map",
            "tax_id=Documento",
            "--unmap",
            "phone",
            "--locale",
            "comma",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some("/tmp/x.db"));
        let Commands::Import(args) = cli.command else { panic!("expected import") };
        assert_eq!(args.entity, EntityType::Patient);
        assert_eq!(args.map, vec!["tax_id=Documento"]);
        assert_eq!(args.unmap, vec!["phone"]);
        assert_eq!(args.locale, Some(DecimalLocale::Comma));
        assert!(!args.dry_run);
    }

    #[test]
    fn test_ledger_entity_alias() {
        let cli = Cli::try_parse_from(["sisdental-import", "export", "ledger"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export { entity: EntityType::LedgerEntry, .. }
        ));
    }

    #[test]
    fn test_open_db_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_db(&dir.path().join("missing.db")).unwrap_err();
        assert!(err.to_string().contains("init"));
    }
}
