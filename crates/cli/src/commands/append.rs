//! append command - append a block to an append blob

use clap::Args;

use super::ls::format_size;
use super::put::{InputArgs, UploadOutput};
use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Append content, creating the append blob on first use
#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Destination path (drive/container/key)
    pub path: String,

    #[command(flatten)]
    pub input: InputArgs,
}

/// Execute the append command
pub async fn execute(args: AppendArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let data = match args.input.read().await {
        Ok(d) => d,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::GeneralError;
        }
    };
    let size = data.len();

    match target.drive.append_blob(&target.path, data).await {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&UploadOutput {
                    success: true,
                    path: args.path,
                    size,
                    content_type: None,
                });
            } else {
                let styled_size = formatter.style_size(&format_size(size as u64));
                formatter.success(&format!("Appended {styled_size} to '{}'.", args.path));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}
