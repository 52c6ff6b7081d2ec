//! Stored access policy commands
//!
//! Policies are named grants kept in a container's ACL. Tokens created with
//! `policy=<name>` defer to them, so editing a policy changes or revokes every
//! token bound to it.

use std::collections::BTreeMap;

use clap::Subcommand;
use console::Term;
use serde::Serialize;

use cd_core::{AccessPolicy, PolicyOutcome, parse_policy_spec};

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Add or replace a named policy
    Set(SetArgs),

    /// List the policies stored on a container
    #[command(name = "ls", alias = "list")]
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Policy path (drive/container/name)
    pub path: String,

    /// Policy string, e.g. "start=0;expiry=30;p=rl"
    pub value: Option<String>,

    /// Replace an existing policy without asking
    #[arg(short, long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Container path (drive/container)
    pub path: String,
}

#[derive(Serialize)]
struct SetOutput {
    success: bool,
    path: String,
    outcome: PolicyOutcome,
}

#[derive(Serialize)]
struct ListOutput {
    policies: BTreeMap<String, AccessPolicy>,
}

/// Execute a policy subcommand
pub async fn execute(cmd: PolicyCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match cmd {
        PolicyCommands::Set(args) => execute_set(args, &formatter).await,
        PolicyCommands::List(args) => execute_list(args, &formatter).await,
    }
}

async fn execute_set(args: SetArgs, formatter: &Formatter) -> ExitCode {
    let spec = match parse_policy_spec(args.value.as_deref()) {
        Ok(s) => s,
        Err(e) => return report(formatter, &e),
    };

    let target = match connect(&args.path, formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let force = args.force;
    let outcome = match target
        .drive
        .set_policy(&target.path, &spec, |prompt| force || confirm(prompt))
        .await
    {
        Ok(o) => o,
        Err(e) => return report(formatter, &e),
    };

    if formatter.is_json() {
        formatter.json(&SetOutput {
            success: outcome != PolicyOutcome::Cancelled,
            path: args.path,
            outcome,
        });
        return ExitCode::Success;
    }

    let styled = formatter.style_name(&args.path);
    match outcome {
        PolicyOutcome::Added => formatter.success(&format!("Policy '{styled}' added.")),
        PolicyOutcome::Updated => formatter.success(&format!("Policy '{styled}' updated.")),
        PolicyOutcome::Cancelled => formatter.warning(&format!("Policy '{styled}' left unchanged.")),
    }
    ExitCode::Success
}

/// Ask on the terminal; anything but yes declines, and so does a non-interactive stderr
fn confirm(prompt: &str) -> bool {
    let term = Term::stderr();
    if !term.is_term() {
        tracing::debug!("Not a terminal, declining: {prompt}");
        return false;
    }
    if term.write_str(&format!("{prompt} [y/N] ")).is_err() {
        return false;
    }
    term.read_line()
        .map(|answer| is_yes(&answer))
        .unwrap_or(false)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn execute_list(args: ListArgs, formatter: &Formatter) -> ExitCode {
    let target = match connect(&args.path, formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let policies = match target.drive.list_policies(&target.path).await {
        Ok(p) => p,
        Err(e) => return report(formatter, &e),
    };

    if formatter.is_json() {
        formatter.json(&ListOutput { policies });
    } else if policies.is_empty() {
        formatter.println("No policies found.");
    } else {
        let mut table = formatter.table(&["NAME", "PERMISSIONS", "START", "EXPIRY"]);
        for (name, policy) in &policies {
            table.add_row(vec![
                name.clone(),
                policy.permissions.to_string(),
                policy.start.map(|t| t.to_string()).unwrap_or_default(),
                policy.expiry.map(|t| t.to_string()).unwrap_or_default(),
            ]);
        }
        formatter.print_table(&table);
    }
    ExitCode::Success
}
