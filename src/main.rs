mod backend;
mod builder;
mod cli;
mod db;
mod decoder;
mod error;
mod export;
mod mapper;
mod models;
mod normalizer;
mod persistence;
mod pipeline;
mod resolver;
mod schema;
mod settings;

use std::env;
use std::sync::OnceLock;

use clap::Parser;
use log::LevelFilter;

use cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sisdental_import", LevelFilter::Info);
        }
        // Fails only if another logger is already installed; keep that one.
        let _ = builder.format_timestamp_millis().try_init();
    });
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let db = cli.db.as_deref();

    // Ok(false): the command ran but the import it reports on failed.
    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(db, data_dir).map(|()| true),
        Commands::Preview {
            file,
            entity,
            rows,
            format,
        } => cli::preview::run(&file, entity, rows, format).map(|()| true),
        Commands::Import(args) => {
            cli::import::run(&settings::db_path(db), &args).map(|report| report.is_success())
        }
        Commands::Export { entity, output } => {
            cli::export::run(&settings::db_path(db), entity, output.as_deref()).map(|()| true)
        }
        Commands::Status => cli::status::run(&settings::db_path(db)).map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
