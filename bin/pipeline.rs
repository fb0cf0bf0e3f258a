use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command};
use plan_import::{
    read_source, reader_from_path, to_csv, ImportConfig, ImportOutcome, ImportRequest, Importer,
    InMemoryStore, STRATEGIC_GOALS,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let file = Arg::new("file")
        .required(true)
        .value_parser(clap::value_parser!(PathBuf));
    let kind = Arg::new("kind")
        .long("kind")
        .env("PLAN_IMPORT_KIND")
        .default_value(STRATEGIC_GOALS);

    Command::new("pipeline")
        .about("Validate, import or export planning CSV files")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .env("PLAN_IMPORT_CONFIG")
                .help("JSON file with ImportConfig fields")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("validate")
                .about("Dry-run validation; prints errors and warnings")
                .arg(file.clone())
                .arg(kind.clone()),
        )
        .subcommand(
            Command::new("import")
                .about("Import into an in-memory store and print the job summary")
                .arg(file.clone())
                .arg(kind.clone())
                .arg(Arg::new("owner").long("owner").default_value("cli"))
                .arg(
                    Arg::new("no-validate")
                        .long("no-validate")
                        .help("Skip the dry-run check; bad rows fail individually")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Format a JSON array of records as CSV on stdout")
                .arg(file)
                .arg(kind),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<ImportConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(ImportConfig::from_json(&text)?)
        }
        None => Ok(ImportConfig::default()),
    }
}

fn required_path(matches: &ArgMatches) -> anyhow::Result<&PathBuf> {
    matches
        .get_one::<PathBuf>("file")
        .context("missing <file> argument")
}

fn kind_arg(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("kind")
        .cloned()
        .unwrap_or_else(|| STRATEGIC_GOALS.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    let mut config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("validate", sub)) => {
            let path = required_path(sub)?;
            let (file, meta) = reader_from_path(path).await?;
            let (text, _info) = read_source(file, &meta, config.max_source_bytes).await?;
            let importer = Importer::new(Arc::new(InMemoryStore::new())).with_config(config);
            let result = importer.validate(&text, &kind_arg(sub)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.into_result()?;
        }
        Some(("import", sub)) => {
            let path = required_path(sub)?;
            if sub.get_flag("no-validate") {
                config.validate_before_import = false;
            }
            if let Some(n) = sub.get_one::<usize>("concurrency") {
                config.concurrency = *n;
            }
            let (file, meta) = reader_from_path(path).await?;
            let (text, info) = read_source(file, &meta, config.max_source_bytes).await?;
            let owner = sub
                .get_one::<String>("owner")
                .cloned()
                .unwrap_or_default();
            let request = ImportRequest::new(text, owner, info.file_name.clone(), kind_arg(sub))
                .with_source(info);

            let importer = Importer::new(Arc::new(InMemoryStore::new())).with_config(config);
            let start = Instant::now();
            let outcome = importer.import(request).await;
            let elapsed = start.elapsed().as_secs_f64();

            match outcome {
                ImportOutcome::Completed(summary) => {
                    println!("{summary} (job {}) elapsed={elapsed:.2}s", summary.job_id);
                    for e in &summary.errors {
                        println!("  row {}: {}", e.row, e.message);
                    }
                }
                ImportOutcome::ValidationFailed(result) => {
                    for e in &result.errors {
                        eprintln!("{e}");
                    }
                    result.into_result()?;
                }
                ImportOutcome::SystemError { message, .. } => bail!(message),
            }
        }
        Some(("export", sub)) => {
            let path = required_path(sub)?;
            let text = tokio::fs::read_to_string(path).await?;
            let records: Vec<Map<String, Value>> = serde_json::from_str(&text)
                .with_context(|| format!("{} must hold a JSON array of objects", path.display()))?;
            let csv = to_csv(&records).await?;
            let name = plan_import::export_filename(&kind_arg(sub), Utc::now().date_naive());
            eprintln!("writing {name}");
            print!("{csv}");
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
