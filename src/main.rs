use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use emopic::assembler::PhotoInformationAssembler;
use emopic::config::Config;
use emopic::db::Database;
use emopic::logging;
use emopic::pipeline::{AnnotationPipeline, PhotoUploadResult};
use emopic::storage::{ObjectNamer, SignedUrlIssuer};

const DEFAULT_PAGE_SIZE: usize = 20;

enum Command {
    Upload(Vec<PathBuf>),
    Info(i64),
    Categories,
    Category { id: i64, page: usize, size: usize },
    Photos { page: usize, size: usize },
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut page = 0;
    let mut size = DEFAULT_PAGE_SIZE;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("emopic {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(required_value(&args, i)));
                i += 1;
            }
            "--page" | "-p" => {
                page = parse_number(&args[i], required_value(&args, i));
                i += 1;
            }
            "--size" | "-s" => {
                size = parse_number(&args[i], required_value(&args, i));
                i += 1;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("upload") => {
            let files: Vec<PathBuf> = positional.map(PathBuf::from).collect();
            if files.is_empty() {
                usage_error("upload requires at least one file");
            }
            Command::Upload(files)
        }
        Some("info") => Command::Info(parse_id("info", positional.next())),
        Some("categories") => Command::Categories,
        Some("category") => Command::Category {
            id: parse_id("category", positional.next()),
            page,
            size,
        },
        Some("photos") => Command::Photos { page, size },
        Some(other) => usage_error(&format!("Unknown command: {}", other)),
        None => usage_error("No command given"),
    };

    CliArgs {
        config_path,
        command,
    }
}

fn required_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => usage_error(&format!("{} requires a value", args[i])),
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> T {
    value
        .parse()
        .unwrap_or_else(|_| usage_error(&format!("{} expects a number, got {:?}", flag, value)))
}

fn parse_id(command: &str, value: Option<String>) -> i64 {
    match value {
        Some(v) => parse_number(command, &v),
        None => usage_error(&format!("{} requires an id", command)),
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"emopic - photo ingestion and annotation

USAGE:
    emopic [OPTIONS] <COMMAND>

COMMANDS:
    upload FILE...          Upload and annotate photos (one worker per file)
    info PHOTO_ID           Show the annotated view of a photo
    categories              List categories with photo counts
    category CATEGORY_ID    List photos in a category
    photos                  List photos, newest first

OPTIONS:
    --config, -c PATH   Path to config file
    --page, -p N        Page number, starting at 0 (default: 0)
    --size, -s N        Page size (default: 20, max: 100)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    EMOPIC_CONFIG       Path to config file (overrides default location)
    EMOPIC_LOG          Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/emopic/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // journald on Linux, rolling file otherwise
    let _ = logging::init(Some(Config::data_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    // Create the schema once before any worker opens its own connection
    open_database(&config)?;

    match args.command {
        Command::Upload(files) => {
            let failed = upload_all(Arc::new(config), files).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Info(photo_id) => {
            let (db, issuer, namer) = read_side(&config)?;
            let assembler = PhotoInformationAssembler::new(&db, &issuer, &namer);
            print_json(&assembler.get_photo_information(photo_id)?)?;
        }
        Command::Categories => {
            let (db, issuer, namer) = read_side(&config)?;
            let assembler = PhotoInformationAssembler::new(&db, &issuer, &namer);
            print_json(&assembler.category_summaries()?)?;
        }
        Command::Category { id, page, size } => {
            let (db, issuer, namer) = read_side(&config)?;
            let assembler = PhotoInformationAssembler::new(&db, &issuer, &namer);
            print_json(&assembler.photos_in_category(id, page, size)?)?;
        }
        Command::Photos { page, size } => {
            let (db, issuer, namer) = read_side(&config)?;
            let assembler = PhotoInformationAssembler::new(&db, &issuer, &namer);
            print_json(&assembler.list_photos(page, size)?)?;
        }
    }

    Ok(())
}

/// Run every upload on its own blocking worker. Returns the number of failed uploads.
async fn upload_all(config: Arc<Config>, files: Vec<PathBuf>) -> Result<usize> {
    info!("Uploading {} file(s)", files.len());

    let handles: Vec<_> = files
        .into_iter()
        .map(|path| {
            let config = Arc::clone(&config);
            let worker_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || upload_one(&config, &worker_path));
            (path, handle)
        })
        .collect();

    let mut failed = 0;
    for (path, handle) in handles {
        match handle.await.context("Upload worker panicked")? {
            Ok(result) => print_json(&serde_json::json!({
                "file": path.display().to_string(),
                "photo_id": result.photo_id,
                "thumbnail_signed_url": result.thumbnail_signed_url,
                "failures": result.failures,
            }))?,
            Err(e) => {
                error!(file = %path.display(), error = %format!("{:#}", e), "Upload failed");
                eprintln!("{}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    Ok(failed)
}

fn upload_one(config: &Config, path: &Path) -> Result<PhotoUploadResult> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let pipeline = AnnotationPipeline::from_config(config, open_database(config)?);
    Ok(pipeline.upload(&bytes)?)
}

fn open_database(config: &Config) -> Result<Database> {
    let path = &config.database.sqlite_path;
    let db = Database::open(path, Duration::from_millis(config.database.busy_timeout_ms))
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    db.initialize()?;
    Ok(db)
}

fn read_side(config: &Config) -> Result<(Database, SignedUrlIssuer, ObjectNamer)> {
    Ok((
        open_database(config)?,
        SignedUrlIssuer::from_config(&config.signing),
        ObjectNamer::new(&config.storage),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
