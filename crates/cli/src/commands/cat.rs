//! cat command - print blob content
//!
//! The path is a query; the first blob it lists is printed. Add `?max=1` or
//! a full key to be explicit about which one.

use clap::Args;
use tokio::io::AsyncWriteExt;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Print the content of the first blob a path matches
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Blob path (drive/container/key[?opts])
    pub path: String,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let content = match target.drive.read_content(&target.path).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            formatter.error(&format!("No blob matches '{}'", args.path));
            return ExitCode::NotFound;
        }
        Err(e) => return report(&formatter, &e),
    };

    let mut stdout = tokio::io::stdout();
    if let Err(e) = stdout.write_all(&content).await {
        formatter.error(&format!("Failed to write output: {e}"));
        return ExitCode::GeneralError;
    }
    if let Err(e) = stdout.flush().await {
        formatter.error(&format!("Failed to write output: {e}"));
        return ExitCode::GeneralError;
    }
    ExitCode::Success
}
