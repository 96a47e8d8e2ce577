//! Command-line surface of repo-backup.
//!
//! Argument parsing, config-file merging, token acquisition and the final exit
//! decision live here. Enumeration, cloning, archiving and upload all live in
//! `repo-backup-core`; this module only wires the real implementations together.
//!
//! Programmatic and test callers use [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use crate::token::read_access_token;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use repo_backup_core::clone::GitCloner;
use repo_backup_core::config::RunContext;
use repo_backup_core::contract::{StorageTarget, UploadOutcome};
use repo_backup_core::enumerate::{GitHubLister, DEFAULT_API_URL};
use repo_backup_core::pipeline::{backup, BackupReport};
use repo_backup_core::upload::S3Store;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for repo-backup: snapshot every repository of a GitHub account.
#[derive(Parser, Debug)]
#[clap(
    name = "repo-backup",
    version,
    about = "Clone every repository of a GitHub account, zip the clones and optionally upload the archive to S3"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone all accessible repositories, archive them and upload the archive if a bucket is given
    Backup(BackupArgs),
}

#[derive(Args, Debug, Default, Clone, PartialEq)]
pub struct BackupArgs {
    /// Prefix of the clone directory; the run timestamp is appended
    #[clap(short = 'd', long)]
    pub destination: Option<String>,

    /// Only back up repositories whose name contains this substring
    #[clap(short = 'f', long)]
    pub filter: Option<String>,

    /// Prefix of the archive file; the run timestamp and `.zip` are appended
    #[clap(short = 'o', long)]
    pub output: Option<String>,

    /// S3 bucket to upload the archive to; upload is skipped without one
    #[clap(long = "s3", value_name = "BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix inside the bucket
    #[clap(long = "s3key", value_name = "PREFIX")]
    pub s3_key: Option<String>,

    /// AWS region of the bucket, overriding the ambient AWS configuration
    #[clap(long)]
    pub region: Option<String>,

    /// Maximum number of clones in flight; unbounded when omitted
    #[clap(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Base URL of the GitHub REST API
    #[clap(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Exit non-zero when any clone or the upload failed
    #[clap(long)]
    pub strict: bool,

    /// YAML file supplying defaults for any of the flags above
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Effective settings of one `backup` invocation after merging flags over the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub destination: String,
    pub output: String,
    pub filter: Option<String>,
    pub storage_target: Option<StorageTarget>,
    pub concurrency: Option<usize>,
    pub api_url: String,
    pub strict: bool,
}

impl Settings {
    /// Flags win; the file fills the gaps; built-in defaults fill the rest.
    pub fn resolve(args: BackupArgs, file: CliConfig) -> Self {
        let file_s3 = file.s3;
        let bucket = args
            .s3_bucket
            .or_else(|| file_s3.as_ref().map(|s| s.bucket.clone()))
            .filter(|b| !b.is_empty());
        let key_prefix = args
            .s3_key
            .or_else(|| file_s3.as_ref().and_then(|s| s.key_prefix.clone()))
            .filter(|k| !k.is_empty());
        let region = args
            .region
            .or_else(|| file_s3.as_ref().and_then(|s| s.region.clone()))
            .filter(|r| !r.is_empty());

        let storage_target = match bucket {
            Some(bucket) => Some(StorageTarget {
                bucket,
                key_prefix,
                region,
            }),
            None => {
                if key_prefix.is_some() || region.is_some() {
                    tracing::warn!("S3 key prefix or region given without a bucket; upload disabled");
                }
                None
            }
        };

        Settings {
            destination: args.destination.or(file.destination).unwrap_or_default(),
            output: args.output.or(file.output).unwrap_or_default(),
            filter: args.filter.or(file.filter),
            storage_target,
            concurrency: args.concurrency.or(file.concurrency),
            api_url: args
                .api_url
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            strict: args.strict || file.strict.unwrap_or(false),
        }
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::now(
            &self.destination,
            &self.output,
            self.filter.clone(),
            self.storage_target.clone(),
            self.concurrency,
        )
    }
}

/// Async CLI entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Backup(args) => {
            let file = match &args.config {
                Some(path) => load_config(path)?,
                None => CliConfig::default(),
            };
            let settings = Settings::resolve(args, file);
            tracing::info!(command = "backup", ?settings, "Settings resolved");

            let token = read_access_token()?;
            let ctx = settings.run_context();

            let lister = GitHubLister::new(settings.api_url.clone());
            let cloner = Arc::new(GitCloner::new());
            let store = match &ctx.storage_target {
                Some(target) => Some(S3Store::from_env(target.region.clone()).await),
                None => None,
            };

            let report = backup(&ctx, &token, &lister, cloner, store.as_ref())
                .await
                .context("backup failed")?;
            print_summary(&report);
            tracing::info!(
                command = "backup",
                dispatched = report.dispatched,
                succeeded = report.succeeded(),
                archive = %report.archive.path.display(),
                "Backup complete"
            );

            let errors = report.errors();
            if settings.strict && !errors.is_empty() {
                let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
                bail!(
                    "{} failure(s) during backup:\n  {}",
                    errors.len(),
                    details.join("\n  ")
                );
            }
            Ok(())
        }
    }
}

fn print_summary(report: &BackupReport) {
    println!(
        "cloned {}/{} repositories",
        report.succeeded(),
        report.dispatched
    );
    for job in report.failed() {
        if let Some(e) = job.error() {
            println!("  failed: {e}");
        }
    }
    println!(
        "archive: {} ({} entries)",
        report.archive.path.display(),
        report.archive.entries()
    );
    match &report.upload {
        Some(UploadOutcome::Succeeded { key }) => println!("uploaded: {key}"),
        Some(outcome) => {
            if let Some(e) = outcome.error() {
                println!("upload failed: {e}");
            }
        }
        None => {}
    }
}
