//! CLI command definitions and dispatch
//!
//! Every command takes a `drive/container/key?opts` path. The first segment
//! names a drive from the config file; the rest is handed to [`BlobDrive`].

use clap::{Parser, Subcommand};

use cd_azure::AzureBlobClient;
use cd_core::{BlobDrive, ConfigManager, Error, OutputFormat, parse_drive_path};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod append;
mod cat;
mod completions;
mod drive;
mod ls;
mod mb;
mod page;
mod pipe;
mod policy;
mod put;
mod rm;
mod sas;

/// cdrive - browse and manage Azure Blob Storage as a drive
#[derive(Parser, Debug)]
#[command(name = "cdrive", version, about, propagate_version = true)]
pub struct Cli {
    /// Output strict JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log backend calls to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage drive definitions
    #[command(subcommand)]
    Drive(drive::DriveCommands),

    /// List containers, blobs or matches of a query path
    #[command(alias = "list")]
    Ls(ls::LsArgs),

    /// Remove a container or every blob a query path matches
    Rm(rm::RmArgs),

    /// Create a container
    Mb(mb::MbArgs),

    /// Upload a block blob, creating the container when needed
    Put(put::PutArgs),

    /// Append to an append blob, creating it when needed
    Append(append::AppendArgs),

    /// Write stdin to a blob
    Pipe(pipe::PipeArgs),

    /// Print the content of the first blob a path matches
    Cat(cat::CatArgs),

    /// Page blob operations
    #[command(subcommand)]
    Page(page::PageCommands),

    /// Generate shared access tokens
    #[command(subcommand)]
    Sas(sas::SasCommands),

    /// Manage stored access policies on a container
    #[command(subcommand)]
    Policy(policy::PolicyCommands),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

impl Cli {
    /// Output switches from the flags, with the config default as fallback for `--json`
    pub fn output_config(&self) -> OutputConfig {
        let json = self.json || config_prefers_json();
        OutputConfig {
            json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }
}

fn config_prefers_json() -> bool {
    ConfigManager::new()
        .and_then(|manager| manager.load())
        .map(|config| config.defaults.output == OutputFormat::Json)
        .unwrap_or(false)
}

/// Run the parsed command
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = cli.output_config();

    match cli.command {
        Commands::Drive(cmd) => drive::execute(cmd, output_config).await,
        Commands::Ls(args) => ls::execute(args, output_config).await,
        Commands::Rm(args) => rm::execute(args, output_config).await,
        Commands::Mb(args) => mb::execute(args, output_config).await,
        Commands::Put(args) => put::execute(args, output_config).await,
        Commands::Append(args) => append::execute(args, output_config).await,
        Commands::Pipe(args) => pipe::execute(args, output_config).await,
        Commands::Cat(args) => cat::execute(args, output_config).await,
        Commands::Page(cmd) => page::execute(cmd, output_config).await,
        Commands::Sas(cmd) => sas::execute(cmd, output_config).await,
        Commands::Policy(cmd) => policy::execute(cmd, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// A connected drive plus the drive-relative part of the CLI path
pub(crate) struct Target {
    pub drive: BlobDrive<AzureBlobClient>,
    pub path: String,
}

/// Look up the drive a CLI path names and connect to it
///
/// Failures are reported through `formatter`; the caller only returns the code.
pub(crate) fn connect(path: &str, formatter: &Formatter) -> Result<Target, ExitCode> {
    let drive_path = parse_drive_path(path).map_err(|e| report(formatter, &e))?;

    let config = ConfigManager::new()
        .and_then(|manager| manager.load())
        .map_err(|e| {
            formatter.error(&format!("Failed to load config: {e}"));
            ExitCode::GeneralError
        })?;

    let definition = config
        .drives
        .iter()
        .find(|d| d.name == drive_path.drive)
        .ok_or_else(|| report(formatter, &Error::DriveNotFound(drive_path.drive.clone())))?;

    let client = AzureBlobClient::new(definition).map_err(|e| report(formatter, &e))?;
    tracing::debug!(drive = %definition.name, path = %drive_path.path, "Connected");

    Ok(Target {
        drive: BlobDrive::new(client).with_scan_config(config.scan),
        path: drive_path.path,
    })
}

/// Print `error` and map it to an exit code
pub(crate) fn report(formatter: &Formatter, error: &Error) -> ExitCode {
    formatter.error(&error.to_string());
    ExitCode::from_error(error)
}
