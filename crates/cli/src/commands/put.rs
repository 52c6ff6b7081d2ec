//! put command - upload a block blob
//!
//! Content comes from `--file`, `--content` or stdin. The container is created
//! when missing; a path naming only a container just creates it. A destination
//! ending in `/` takes the local file name, as `cp` does.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use cd_core::path::join_path;
use clap::Args;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use super::ls::format_size;
use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Upload a block blob
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Destination path (drive/container/key)
    pub path: String,

    #[command(flatten)]
    pub input: InputArgs,

    /// Content type; guessed from the file or blob name when omitted
    #[arg(long)]
    pub content_type: Option<String>,
}

/// Where uploaded content comes from
#[derive(Args, Debug, Default)]
pub struct InputArgs {
    /// Read content from a local file
    #[arg(short, long, conflicts_with = "content")]
    pub file: Option<PathBuf>,

    /// Use this string as content
    #[arg(short, long)]
    pub content: Option<String>,
}

impl InputArgs {
    /// The bytes to upload; stdin when neither flag is given
    pub async fn read(&self) -> anyhow::Result<Bytes> {
        if let Some(file) = &self.file {
            let data = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            return Ok(Bytes::from(data));
        }
        if let Some(content) = &self.content {
            return Ok(Bytes::from(content.clone()));
        }

        let mut data = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .context("Failed to read stdin")?;
        Ok(Bytes::from(data))
    }
}

#[derive(Serialize)]
pub(crate) struct UploadOutput {
    pub success: bool,
    pub path: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Content type for an upload: explicit, then the local file, then the blob name
pub(crate) fn guess_content_type(explicit: Option<&str>, file: Option<&Path>, blob_path: &str) -> Option<String> {
    if let Some(ct) = explicit {
        return Some(ct.to_string());
    }
    let name = blob_path.split('?').next().unwrap_or(blob_path);
    file.and_then(|f| mime_guess::from_path(f).first())
        .or_else(|| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
}

/// Destination for an upload; a directory-like path gets the file name appended
pub(crate) fn upload_destination(path: &str, file: Option<&Path>) -> String {
    let name = file.and_then(Path::file_name).and_then(|n| n.to_str());
    match name {
        Some(name) if path.ends_with('/') => join_path(path, name),
        _ => path.to_string(),
    }
}

/// Execute the put command
pub async fn execute(args: PutArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let destination = upload_destination(&args.path, args.input.file.as_deref());
    let target = match connect(&destination, &formatter) {
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
    let content_type = guess_content_type(args.content_type.as_deref(), args.input.file.as_deref(), &target.path);

    match target
        .drive
        .write_block_blob(&target.path, data, content_type.clone())
        .await
    {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&UploadOutput {
                    success: true,
                    path: destination,
                    size,
                    content_type,
                });
            } else {
                let styled_size = formatter.style_size(&format_size(size as u64));
                formatter.success(&format!("Uploaded {styled_size} to '{destination}'."));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}
