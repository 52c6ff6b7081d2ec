//! page command - page blob operations
//!
//! Page blobs are sparse: only written pages are stored. `page ls` walks the
//! occupied ranges with an adaptive window, `page fill` writes random pages
//! concurrently, which is handy for producing sparse test disks.

use std::time::Duration;

use clap::Subcommand;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use cd_core::{FillReport, PAGE_SIZE, PageRange, RandomWriteDriver};

use super::ls::format_size;
use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum PageCommands {
    /// Create an empty page blob
    Create(CreateArgs),

    /// List the occupied ranges of a page blob
    #[command(alias = "list")]
    Ls(LsArgs),

    /// Write random content into random pages
    Fill(FillArgs),
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Page blob path (drive/container/key)
    pub path: String,

    /// Size in bytes, a multiple of 512
    pub size: u64,
}

#[derive(clap::Args, Debug)]
pub struct LsArgs {
    /// Page blob path (drive/container/key)
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct FillArgs {
    /// Page blob path (drive/container/key)
    pub path: String,

    /// Number of pages to write
    pub count: Option<String>,

    /// Seed for reproducible offsets and content
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Serialize)]
struct CreateOutput {
    success: bool,
    path: String,
    size: u64,
}

#[derive(Serialize)]
struct RangesOutput {
    path: String,
    ranges: Vec<PageRange>,
    occupied_bytes: u64,
}

#[derive(Serialize)]
struct FillOutput {
    success: bool,
    path: String,
    #[serde(flatten)]
    report: FillReport,
}

/// Execute a page subcommand
pub async fn execute(cmd: PageCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match cmd {
        PageCommands::Create(args) => execute_create(args, &formatter).await,
        PageCommands::Ls(args) => execute_ls(args, &formatter).await,
        PageCommands::Fill(args) => execute_fill(args, &formatter).await,
    }
}

async fn execute_create(args: CreateArgs, formatter: &Formatter) -> ExitCode {
    let target = match connect(&args.path, formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    match target.drive.create_page_blob(&target.path, args.size).await {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&CreateOutput {
                    success: true,
                    path: args.path,
                    size: args.size,
                });
            } else {
                let styled_size = formatter.style_size(&format_size(args.size));
                formatter.success(&format!("Page blob '{}' created ({styled_size}).", args.path));
            }
            ExitCode::Success
        }
        Err(e) => report(formatter, &e),
    }
}

async fn execute_ls(args: LsArgs, formatter: &Formatter) -> ExitCode {
    let target = match connect(&args.path, formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let ranges: Vec<PageRange> = match target.drive.list_page_ranges(&target.path).await {
        Ok(stream) => match stream.try_collect().await {
            Ok(r) => r,
            Err(e) => return report(formatter, &e),
        },
        Err(e) => return report(formatter, &e),
    };
    let occupied_bytes: u64 = ranges.iter().map(PageRange::length).sum();

    if formatter.is_json() {
        formatter.json(&RangesOutput {
            path: args.path,
            ranges,
            occupied_bytes,
        });
        return ExitCode::Success;
    }

    if ranges.is_empty() {
        formatter.println("No pages written.");
        return ExitCode::Success;
    }

    let mut table = formatter.table(&["START", "END", "SIZE"]);
    for range in &ranges {
        table.add_row(vec![
            range.start.to_string(),
            range.end.to_string(),
            format_size(range.length()),
        ]);
    }
    formatter.print_table(&table);
    formatter.println(&format!(
        "{} range(s), {} occupied",
        ranges.len(),
        formatter.style_size(&format_size(occupied_bytes))
    ));
    ExitCode::Success
}

async fn execute_fill(args: FillArgs, formatter: &Formatter) -> ExitCode {
    let target = match connect(&args.path, formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let driver = match args.seed {
        Some(seed) => RandomWriteDriver::with_seed(seed),
        None => RandomWriteDriver::new(),
    };

    let spinner = formatter.show_progress().then(|| fill_spinner(&args));
    let fill = target
        .drive
        .fill_random_pages(&target.path, args.count.as_deref(), driver);
    let result = tokio::select! {
        result = fill => result,
        _ = tokio::signal::ctrl_c() => {
            if let Some(pb) = &spinner {
                pb.abandon_with_message("Interrupted");
            }
            formatter.warning("Interrupted; some pages may already be written");
            return ExitCode::Interrupted;
        }
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    match result {
        Ok(fill) => {
            if formatter.is_json() {
                formatter.json(&FillOutput {
                    success: true,
                    path: args.path,
                    report: fill,
                });
            } else {
                formatter.success(&format!(
                    "Wrote {} page(s) of {PAGE_SIZE} bytes to '{}' ({} distinct).",
                    fill.writes, args.path, fill.distinct_pages
                ));
            }
            ExitCode::Success
        }
        Err(e) => report(formatter, &e),
    }
}

fn fill_spinner(args: &FillArgs) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!(
        "Writing {} random page(s) to {}",
        args.count.as_deref().unwrap_or("?"),
        args.path
    ));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
