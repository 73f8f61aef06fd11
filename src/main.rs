/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;

use hwelab::file_reader::OsFileReader;
use hwelab::preprocessor::DefineValue;
use hwelab::report::Severity;
use hwelab::{build_project, BuildOptions};

#[derive(ClapParser)]
#[clap(version = "0.1.0")]
struct Opts {
    /// Top-level source file to elaborate.
    #[clap(short, long)]
    input: PathBuf,

    /// Name of the top `mod` record to elaborate.
    #[clap(short, long)]
    top: String,

    /// Where to write the elaborated design graph as JSON.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Additional include search-path directories, may repeat.
    #[clap(short = 'I', long = "include")]
    includes: Vec<PathBuf>,

    /// Preprocessor defines as NAME=VALUE, may repeat.
    #[clap(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Waiver files, one hash per line, may repeat.
    #[clap(long = "waiver")]
    waivers: Vec<PathBuf>,

    /// Caps recursive module expansion depth.
    #[clap(long)]
    max_depth: Option<usize>,

    /// Skips the rule-checker stage.
    #[clap(long)]
    no_checks: bool,

    /// Writes a Make-style dependency rule to this path.
    #[clap(short = 'M', long = "depfile")]
    depfile: Option<PathBuf>,

    /// Logs per-stage timing.
    #[clap(long)]
    profile: bool,

    /// Suppresses non-essential progress logging.
    #[clap(short, long)]
    quiet: bool,
}

fn parse_define(raw: &str) -> Result<(String, DefineValue)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("define '{raw}' is missing '='"))?;
    let value = if let Ok(i) = value.parse::<i64>() {
        DefineValue::Int(i)
    } else if value == "true" {
        DefineValue::Bool(true)
    } else if value == "false" {
        DefineValue::Bool(false)
    } else {
        DefineValue::Str(value.to_string())
    };
    Ok((name.to_string(), value))
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    if !opts.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let mut defines = HashMap::new();
    for raw in &opts.defines {
        let (name, value) = parse_define(raw)?;
        defines.insert(name, value);
    }

    let mut waivers = std::collections::HashSet::new();
    for path in &opts.waivers {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read waiver file '{}'", path.display()))?;
        waivers.extend(hwelab::checker::parse_waivers(&text));
    }

    let build_opts = BuildOptions {
        top_file: &opts.input,
        top_name: &opts.top,
        includes: opts.includes.clone(),
        defines,
        max_depth: opts.max_depth,
        run_checks: !opts.no_checks,
        waivers,
        profile: opts.profile,
        quiet: opts.quiet,
    };

    let reader = OsFileReader;
    let outcome = build_project(&build_opts, &reader)?;

    for entry in outcome.report.entries() {
        if !opts.quiet || entry.severity >= Severity::Warning {
            eprintln!("[{:?}] {}: {}", entry.severity, entry.category_path(), entry.message);
        }
    }
    for violation in &outcome.violations {
        eprintln!(
            "[{:?}] {} ({}): {}",
            violation.severity, violation.check_name, violation.node_kind, violation.message
        );
    }

    if let Some(depfile_path) = &opts.depfile {
        let target = opts.output.clone().unwrap_or_else(|| opts.input.clone());
        fs::write(depfile_path, outcome.deps.format_rule(&target))
            .with_context(|| format!("failed to write depfile '{}'", depfile_path.display()))?;
    }

    let Some(project) = outcome.project else {
        anyhow::bail!("elaboration aborted: validation reported critical errors");
    };

    if let Some(output_path) = &opts.output {
        let json = serde_json::to_string_pretty(&project)?;
        fs::write(output_path, json)
            .with_context(|| format!("failed to write output '{}'", output_path.display()))?;
        if !opts.quiet {
            println!("Successfully elaborated {} to {}", opts.input.display(), output_path.display());
        }
    }

    if outcome.report.has_errors() || violation_has_errors(&outcome.violations) {
        anyhow::bail!("elaboration completed with errors");
    }

    Ok(())
}

fn violation_has_errors(violations: &[hwelab::checker::RuleViolation]) -> bool {
    violations.iter().any(|v| v.severity == Severity::Error)
}
