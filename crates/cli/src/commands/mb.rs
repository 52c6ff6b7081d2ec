//! mb command - make a container

use clap::Args;
use serde::Serialize;

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Create a container; deeper segments are ignored
#[derive(Args, Debug)]
pub struct MbArgs {
    /// Container path (drive/container)
    pub path: String,
}

#[derive(Serialize)]
struct MbOutput {
    success: bool,
    path: String,
    created: bool,
}

/// Execute the mb command
pub async fn execute(args: MbArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    match target.drive.create_directory(&target.path).await {
        Ok(created) => {
            if formatter.is_json() {
                formatter.json(&MbOutput {
                    success: true,
                    path: args.path,
                    created,
                });
            } else if created {
                let styled = formatter.style_container(&args.path);
                formatter.success(&format!("Container '{styled}' created."));
            } else {
                let styled = formatter.style_container(&args.path);
                formatter.println(&format!("Container '{styled}' already exists."));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}
