//! rm command - remove containers and blobs
//!
//! `drive/container` deletes the container. Any deeper path is a query and
//! deletes every blob it lists; `?include=snapshots` and `?hidden` widen the match.

use clap::Args;
use serde::Serialize;

use cd_core::RemoveReport;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Remove a container or the blobs a query path matches
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Path to remove (drive/container[/prefix][?opts])
    pub path: String,
}

#[derive(Serialize)]
struct RmOutput {
    success: bool,
    path: String,
    #[serde(flatten)]
    report: RemoveReport,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let removed = match target.drive.remove_item(&target.path).await {
        Ok(r) => r,
        Err(e) => return report(&formatter, &e),
    };

    if formatter.is_json() {
        formatter.json(&RmOutput {
            success: true,
            path: args.path,
            report: removed,
        });
    } else {
        formatter.success(&describe(&removed, &args.path));
    }
    ExitCode::Success
}

fn describe(report: &RemoveReport, path: &str) -> String {
    match (report.containers_deleted, report.blobs_deleted) {
        (0, 0) => format!("Nothing to remove at '{path}'."),
        (c, 0) => format!("Removed {c} container(s) at '{path}'."),
        (0, b) => format!("Removed {b} blob(s) at '{path}'."),
        (c, b) => format!("Removed {c} container(s) and {b} blob(s) at '{path}'."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let mut report = RemoveReport::default();
        assert_eq!(describe(&report, "p/c"), "Nothing to remove at 'p/c'.");
        report.blobs_deleted = 3;
        assert_eq!(describe(&report, "p/c/x"), "Removed 3 blob(s) at 'p/c/x'.");
        report = RemoveReport {
            containers_deleted: 1,
            blobs_deleted: 0,
        };
        assert_eq!(describe(&report, "p/c"), "Removed 1 container(s) at 'p/c'.");
    }

    #[test]
    fn test_output_flattens_report() {
        let output = RmOutput {
            success: true,
            path: "prod/logs".into(),
            report: RemoveReport {
                containers_deleted: 1,
                blobs_deleted: 0,
            },
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["containers_deleted"], 1);
        assert_eq!(json["blobs_deleted"], 0);
    }
}
