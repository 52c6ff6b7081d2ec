//! sas command - generate shared access tokens
//!
//! The value string uses the policy grammar:
//! `start=<days>;expiry=<days>;policy=<policy>;p=rwdl`. Days are offsets from
//! now. With `policy=` the token references a stored container policy.

use clap::Subcommand;
use serde::Serialize;

use cd_core::{PolicySpec, parse_policy_spec};

use super::{connect, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum SasCommands {
    /// Token scoped to a container, printed as a `?`-prefixed query
    Container(SasArgs),

    /// Full blob URL carrying a token
    Blob(SasArgs),
}

impl SasCommands {
    fn args(&self) -> &SasArgs {
        match self {
            SasCommands::Container(args) | SasCommands::Blob(args) => args,
        }
    }

    fn token_type(&self) -> &'static str {
        match self {
            SasCommands::Container(_) => "container",
            SasCommands::Blob(_) => "blob",
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct SasArgs {
    /// Container or blob path (drive/container[/key])
    pub path: String,

    /// Policy string, e.g. "expiry=7;p=rl" or "policy=readers"
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
struct SasOutput {
    path: String,
    #[serde(rename = "type")]
    token_type: &'static str,
    token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<String>,
}

/// Execute a sas subcommand
pub async fn execute(cmd: SasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let args = cmd.args();

    let spec = match parse_policy_spec(args.value.as_deref()) {
        Ok(s) => s,
        Err(e) => return report(&formatter, &e),
    };

    let target = match connect(&args.path, &formatter) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let token = match &cmd {
        SasCommands::Container(_) => target.drive.container_sas(&target.path, &spec),
        SasCommands::Blob(_) => target.drive.blob_sas(&target.path, &spec),
    };
    let token = match token {
        Ok(t) => t,
        Err(e) => return report(&formatter, &e),
    };

    let output = sas_output(args.path.clone(), cmd.token_type(), token, &spec);
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.println(&formatter.style_url(&output.token));
        if let Some(expires) = &output.expires {
            formatter.println(&format!("{} {}", formatter.style_key("Expires:"), formatter.style_date(expires)));
        }
    }
    ExitCode::Success
}

fn sas_output(path: String, token_type: &'static str, token: String, spec: &PolicySpec) -> SasOutput {
    SasOutput {
        path,
        token_type,
        token,
        policy: spec.policy_name.clone(),
        expires: spec.policy.expiry.map(|ts| ts.to_string()),
    }
}
