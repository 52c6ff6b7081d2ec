//! Drive management commands
//!
//! A drive is a named storage account: its kind, endpoint, account name and
//! shared key. Definitions live in the config file.

use clap::Subcommand;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use cd_core::{Drive, DriveManager, StorageKind};

/// Drive subcommands
#[derive(Subcommand, Debug)]
pub enum DriveCommands {
    /// Add or update a drive
    Set(SetArgs),

    /// List all configured drives
    #[command(alias = "ls")]
    List(ListArgs),

    /// Remove a drive
    #[command(alias = "rm")]
    Remove(RemoveArgs),
}

/// Arguments for the `drive set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Drive name used as the first path segment (e.g. "prod", "local")
    pub name: String,

    /// Connection string: `<endpoint>?account=<account>&key=<key>`
    #[arg(conflicts_with_all = ["endpoint", "account"])]
    pub connection: Option<String>,

    /// Storage kind behind the drive
    #[arg(long, default_value = "azureblob")]
    pub kind: StorageKind,

    /// Service endpoint (e.g. `https://myacct.blob.core.windows.net`)
    #[arg(long, requires_all = ["account", "key"])]
    pub endpoint: Option<String>,

    /// Storage account name
    #[arg(long)]
    pub account: Option<String>,

    /// Base64 shared key
    #[arg(long, env = "CDRIVE_ACCOUNT_KEY", hide_env_values = true)]
    pub key: Option<String>,
}

/// Arguments for the `drive list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show account names and storage kinds
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `drive remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the drive to remove
    pub name: String,
}

#[derive(Serialize)]
struct DriveListOutput {
    drives: Vec<DriveInfo>,
}

/// Drive information for JSON output (the key is never printed)
#[derive(Serialize)]
struct DriveInfo {
    name: String,
    kind: StorageKind,
    endpoint: String,
    account: String,
}

impl From<&Drive> for DriveInfo {
    fn from(drive: &Drive) -> Self {
        Self {
            name: drive.name.clone(),
            kind: drive.kind,
            endpoint: drive.endpoint.clone(),
            account: drive.account.clone(),
        }
    }
}

#[derive(Serialize)]
struct DriveOperationOutput {
    success: bool,
    drive: String,
    message: String,
}

/// Execute a drive subcommand
pub async fn execute(cmd: DriveCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match DriveManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&format!("Failed to load drives: {e}"));
            return ExitCode::GeneralError;
        }
    };

    match cmd {
        DriveCommands::Set(args) => execute_set(args, &manager, &formatter),
        DriveCommands::List(args) => execute_list(args, &manager, &formatter),
        DriveCommands::Remove(args) => execute_remove(args, &manager, &formatter),
    }
}

fn build_drive(args: &SetArgs) -> cd_core::Result<Drive> {
    if let Some(connection) = &args.connection {
        return Drive::from_connection(&args.name, args.kind, connection);
    }

    match (&args.endpoint, &args.account, &args.key) {
        (Some(endpoint), Some(account), Some(key)) => {
            let drive = Drive::new(&args.name, args.kind, endpoint.trim_end_matches('/'), account, key);
            drive.validate()?;
            Ok(drive)
        }
        _ => Err(cd_core::Error::MissingValue(
            "Give a connection string or --endpoint, --account and --key".into(),
        )),
    }
}

fn execute_set(args: SetArgs, manager: &DriveManager, formatter: &Formatter) -> ExitCode {
    let drive = match build_drive(&args) {
        Ok(d) => d,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    if !drive.kind.is_supported() {
        formatter.warning(&format!(
            "Storage kind '{}' is not supported yet; commands on this drive will fail",
            drive.kind
        ));
    }

    match manager.set(drive) {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&DriveOperationOutput {
                    success: true,
                    drive: args.name.clone(),
                    message: format!("Drive '{}' configured successfully", args.name),
                });
            } else {
                let styled_name = formatter.style_name(&args.name);
                formatter.success(&format!("Drive '{styled_name}' configured successfully."));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::GeneralError
        }
    }
}

fn execute_list(args: ListArgs, manager: &DriveManager, formatter: &Formatter) -> ExitCode {
    let drives = match manager.list() {
        Ok(d) => d,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::GeneralError;
        }
    };

    if formatter.is_json() {
        formatter.json(&DriveListOutput {
            drives: drives.iter().map(DriveInfo::from).collect(),
        });
    } else if drives.is_empty() {
        formatter.println("No drives configured.");
    } else if args.long {
        for drive in &drives {
            let styled_name = formatter.style_name(&format!("{:<12}", drive.name));
            let styled_url = formatter.style_url(&drive.endpoint);
            let styled_account = formatter.style_date(&drive.account);
            let styled_kind = formatter.style_date(drive.kind.as_str());
            formatter.println(&format!(
                "{styled_name} {styled_url} (account: {styled_account}, kind: {styled_kind})"
            ));
        }
    } else {
        for drive in &drives {
            let styled_name = formatter.style_name(&format!("{:<12}", drive.name));
            let styled_url = formatter.style_url(&drive.endpoint);
            formatter.println(&format!("{styled_name} {styled_url}"));
        }
    }
    ExitCode::Success
}

fn execute_remove(args: RemoveArgs, manager: &DriveManager, formatter: &Formatter) -> ExitCode {
    match manager.remove(&args.name) {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&DriveOperationOutput {
                    success: true,
                    drive: args.name.clone(),
                    message: format!("Drive '{}' removed successfully", args.name),
                });
            } else {
                let styled_name = formatter.style_name(&args.name);
                formatter.success(&format!("Drive '{styled_name}' removed successfully."));
            }
            ExitCode::Success
        }
        Err(cd_core::Error::DriveNotFound(_)) => {
            formatter.error(&format!("Drive '{}' not found", args.name));
            ExitCode::NotFound
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::GeneralError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_args(connection: Option<&str>) -> SetArgs {
        SetArgs {
            name: "prod".to_string(),
            connection: connection.map(str::to_string),
            kind: StorageKind::Blob,
            endpoint: None,
            account: None,
            key: None,
        }
    }

    #[test]
    fn test_build_drive_from_connection() {
        let args = set_args(Some("https://acct.blob.core.windows.net/?account=acct&key=a2V5+/=="));
        let drive = build_drive(&args).unwrap();
        assert_eq!(drive.endpoint, "https://acct.blob.core.windows.net");
        assert_eq!(drive.account, "acct");
        assert_eq!(drive.key, "a2V5+/==");
    }

    #[test]
    fn test_build_drive_from_flags() {
        let mut args = set_args(None);
        args.endpoint = Some("http://127.0.0.1:10000/devstoreaccount1/".to_string());
        args.account = Some("devstoreaccount1".to_string());
        args.key = Some("a2V5".to_string());
        let drive = build_drive(&args).unwrap();
        assert_eq!(drive.endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_build_drive_needs_credentials() {
        assert!(matches!(
            build_drive(&set_args(None)),
            Err(cd_core::Error::MissingValue(_))
        ));
    }

    #[test]
    fn test_drive_info_hides_key() {
        let drive = Drive::new("prod", StorageKind::Blob, "https://a.example", "acct", "secret");
        let json = serde_json::to_value(DriveInfo::from(&drive)).unwrap();
        assert_eq!(json["kind"], "azureblob");
        assert!(json.get("key").is_none());
    }
}
