/*!
 * bucketfs CLI - filesystem commands against an S3 bucket
 */

use anyhow::{Context, Result};
use bucketfs::{
    logging::{self, LoggingConfig},
    store::CreateBucketOptions,
    BucketFs, FileBody, FsConfig, ObjectStore, PutOptions, S3Store,
};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "bucketfs")]
#[command(version, about = "Filesystem-style commands for S3 buckets", long_about = None)]
struct Cli {
    /// Bucket spec (`bucket/sub/path`) or URI (`s3://bucket/sub/path`)
    #[arg(short = 'b', long = "bucket", value_name = "SPEC", global = true)]
    bucket: Option<String>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Custom endpoint (MinIO, LocalStack, ...); implies path-style addressing
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Multipart part size in bytes
    #[arg(long, value_name = "BYTES", global = true)]
    part_size: Option<usize>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the immediate children of a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// List every descendant of a directory
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show object entries with size and modification time
    Dstat {
        #[arg(default_value = "/")]
        path: String,

        /// Recurse into sub-directories
        #[arg(short = 'R', long)]
        recursive: bool,

        /// Start after this entry
        #[arg(long)]
        marker: Option<String>,
    },

    /// Show a stat record for a path
    Stat { path: String },

    /// Print an object to stdout
    Cat { path: String },

    /// Upload a local file, or stdin when no file is given
    Put {
        path: String,

        /// Local file to upload
        source: Option<PathBuf>,

        /// Content type of the new object
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Create a directory marker
    Mkdir { path: String },

    /// Delete objects
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Delete a directory marker, or a whole tree with -R
    Rmdir {
        path: String,

        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Copy an object, or a whole directory with -R
    Cp {
        source: String,
        destination: String,

        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Create the bucket
    MakeBucket {
        /// Location constraint for the new bucket
        #[arg(long)]
        location: Option<String>,
    },

    /// Delete the bucket; --force removes its contents first
    RemoveBucket {
        #[arg(long)]
        force: bool,
    },

    /// Install an expiration rule
    Lifecycle {
        name: String,
        prefix: String,
        days: i32,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<FsConfig> {
    let mut config = match &cli.config {
        Some(path) => FsConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FsConfig::default(),
    };

    if let Some(spec) = &cli.bucket {
        if spec.starts_with("s3://") {
            let parsed = FsConfig::from_uri(spec)?;
            config.bucket = parsed.bucket;
            config.region = parsed.region.or(config.region);
            if parsed.endpoint.is_some() {
                config.endpoint = parsed.endpoint;
                config.force_path_style = true;
            }
        } else {
            config.bucket = spec.clone();
        }
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = Some(endpoint.clone());
        config.force_path_style = true;
    }
    if let Some(region) = &cli.region {
        config.region = Some(region.clone());
    }
    if let Some(part_size) = cli.part_size {
        config.part_size = part_size;
    }

    config.validate_for_s3().context("Invalid configuration")?;
    Ok(config)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut logging_config = LoggingConfig::try_from(&config)?;
    if cli.verbose {
        logging_config = logging_config.verbose();
    }
    logging::init_logging(&logging_config)?;

    let Cli { command, json, .. } = cli;
    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    runtime.block_on(async move {
        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config).await?);
        let fs = BucketFs::from_config(store, &config)?;
        execute(&fs, command, json).await
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_names(names: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(&names);
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

async fn execute(fs: &BucketFs, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Ls { path } => print_names(&fs.readdir(&path).await?, json),
        Commands::Tree { path } => print_names(&fs.readdirp(&path).await?, json),
        Commands::Dstat {
            path,
            recursive,
            marker,
        } => {
            let entries = if recursive {
                fs.list_contents(&path, marker.as_deref()).await?
            } else {
                fs.dstat(&path, marker.as_deref()).await?
            };
            if json {
                return print_json(&entries);
            }
            for entry in entries {
                let modified = entry
                    .last_modified
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>12}  {}  {}", entry.size, modified, entry.key);
            }
            Ok(())
        }
        Commands::Stat { path } => {
            let stats = fs.stat(&path).await?;
            if json {
                return print_json(&stats);
            }
            let kind = if stats.is_directory() { "directory" } else { "file" };
            println!("{}: {}, {} bytes, modified {}", stats.path(), kind, stats.size, stats.mtime);
            Ok(())
        }
        Commands::Cat { path } => {
            let mut stream = fs.create_read_stream(&path).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.try_next().await? {
                stdout.write_all(&chunk).await?;
            }
            stdout.flush().await?;
            Ok(())
        }
        Commands::Put {
            path,
            source,
            content_type,
        } => {
            let mut options = PutOptions::new();
            options.content_type = content_type;
            let body = match source {
                Some(file) => FileBody::reader(
                    tokio::fs::File::open(&file)
                        .await
                        .with_context(|| format!("Cannot open {}", file.display()))?,
                ),
                None => FileBody::reader(tokio::io::stdin()),
            };
            let summary = fs.write_file(&path, body, &options).await?;
            if json {
                return print_json(&summary);
            }
            println!(
                "{} ({} bytes, {} parts)",
                summary.key, summary.size, summary.parts
            );
            Ok(())
        }
        Commands::Mkdir { path } => Ok(fs.mkdir(&path).await?),
        Commands::Rm { paths } => {
            let output = fs.rm_files(paths.as_slice()).await?;
            if json {
                return print_json(&output);
            }
            for error in &output.errors {
                eprintln!(
                    "{}: {}",
                    error.key,
                    error.message.as_deref().unwrap_or("delete failed")
                );
            }
            if output.errors.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("{} objects could not be deleted", output.errors.len())
            }
        }
        Commands::Rmdir { path, recursive } => {
            if recursive {
                fs.rmdirp(&path).await?;
            } else {
                fs.rmdir(&path).await?;
            }
            Ok(())
        }
        Commands::Cp {
            source,
            destination,
            recursive,
        } => {
            if recursive {
                fs.copy_directory(&source, &destination).await?;
            } else {
                fs.copy_object(&source, &destination).await?;
            }
            Ok(())
        }
        Commands::MakeBucket { location } => {
            fs.create(CreateBucketOptions {
                location_constraint: location,
            })
            .await?;
            Ok(())
        }
        Commands::RemoveBucket { force } => {
            if force {
                fs.destroy().await?;
            } else {
                fs.delete().await?;
            }
            Ok(())
        }
        Commands::Lifecycle { name, prefix, days } => {
            fs.put_bucket_lifecycle(&name, &prefix, days).await?;
            Ok(())
        }
    }
}
