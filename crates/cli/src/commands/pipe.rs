//! pipe command - stream stdin into a blob
//!
//! Unlike `put`, the path must name a blob and the container must already
//! exist.

use bytes::Bytes;
use clap::Args;
use tokio::io::AsyncReadExt;

use super::put::{UploadOutput, guess_content_type};
use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Write stdin to a blob
#[derive(Args, Debug)]
pub struct PipeArgs {
    /// Destination path (drive/container/key)
    pub path: String,

    /// Content type; guessed from the blob name when omitted
    #[arg(long)]
    pub content_type: Option<String>,
}

/// Execute the pipe command
pub async fn execute(args: PipeArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let mut data = Vec::new();
    if let Err(e) = tokio::io::stdin().read_to_end(&mut data).await {
        formatter.error(&format!("Failed to read stdin: {e}"));
        return ExitCode::GeneralError;
    }
    let size = data.len();
    let content_type = guess_content_type(args.content_type.as_deref(), None, &target.path);

    match target
        .drive
        .write_content(&target.path, Bytes::from(data), content_type.clone())
        .await
    {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&UploadOutput {
                    success: true,
                    path: args.path,
                    size,
                    content_type,
                });
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}
