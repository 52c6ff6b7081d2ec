//! ls command - list containers and blobs
//!
//! `drive` lists containers, `drive/container` lists every blob in it and
//! `drive/container/prefix?opts` lists what the query matches.

use clap::Args;
use futures::TryStreamExt;
use jiff::Timestamp;
use serde::Serialize;

use cd_core::{DriveItem, Error};

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List containers, blobs or the matches of a query path
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Path to list (drive[/container[/prefix]][?opts])
    pub path: String,

    /// Print names only
    #[arg(long)]
    pub names: bool,
}

#[derive(Serialize)]
struct LsOutput {
    items: Vec<DriveItem>,
}

#[derive(Serialize)]
struct NamesOutput {
    names: Vec<String>,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    if args.names {
        return match target.drive.child_names(&target.path).await {
            Ok(names) => {
                if formatter.is_json() {
                    formatter.json(&NamesOutput { names });
                } else {
                    names.iter().for_each(|n| formatter.println(n));
                }
                ExitCode::Success
            }
            Err(e) => report(&formatter, &e),
        };
    }

    let items: Result<Vec<DriveItem>, Error> = match target.drive.list_items(&target.path).await {
        Ok(stream) => stream.try_collect().await,
        Err(e) => Err(e),
    };
    let items = match items {
        Ok(items) => items,
        Err(e) => return report(&formatter, &e),
    };

    if formatter.is_json() {
        formatter.json(&LsOutput { items });
    } else if items.is_empty() {
        formatter.println("No items found.");
    } else {
        print_table(&items, &formatter);
    }
    ExitCode::Success
}

fn print_table(items: &[DriveItem], formatter: &Formatter) {
    let mut table = formatter.table(&["TYPE", "SIZE", "MODIFIED", "NAME"]);
    for item in items {
        let row = match item {
            DriveItem::Container(c) => vec![
                "container".to_string(),
                String::new(),
                format_time(c.last_modified),
                formatter.style_container(&c.name),
            ],
            DriveItem::Blob(b) => {
                let mut name = b.name.clone();
                if let Some(snapshot) = &b.snapshot {
                    name.push_str(&format!(" @{snapshot}"));
                }
                if b.deleted {
                    name.push_str(" (deleted)");
                }
                vec![
                    b.kind.to_string(),
                    format_size(b.size),
                    format_time(b.last_modified),
                    name,
                ]
            }
        };
        table.add_row(row);
    }
    formatter.print_table(&table);
}

pub(crate) fn format_size(size: u64) -> String {
    humansize::format_size(size, humansize::BINARY)
}

fn format_time(ts: Option<Timestamp>) -> String {
    ts.map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
