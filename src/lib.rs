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

//! Entry point for the hardware-design elaboration pipeline:
//! preprocess -> parse -> validate -> elaborate -> (optional) check, wired
//! together as one function with a `Context`-annotated `?` at every
//! stage boundary.

pub mod checker;
pub mod depfile;
pub mod elaborate;
pub mod errors;
pub mod file_reader;
pub mod graph;
pub mod preprocessor;
pub mod report;
pub mod schema;
pub mod validate;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, info_span};

use checker::{Registry, RuleViolation};
use depfile::DepFile;
use file_reader::FileReader;
use graph::Project;
use preprocessor::DefineValue;
use report::Report;

/// Configuration surface for one [`build_project`] run.
pub struct BuildOptions<'a> {
    pub top_file: &'a Path,
    pub top_name: &'a str,
    pub includes: Vec<PathBuf>,
    pub defines: HashMap<String, DefineValue>,
    pub max_depth: Option<usize>,
    pub run_checks: bool,
    pub waivers: HashSet<String>,
    pub profile: bool,
    pub quiet: bool,
}

impl<'a> BuildOptions<'a> {
    pub fn new(top_file: &'a Path, top_name: &'a str) -> Self {
        Self {
            top_file,
            top_name,
            includes: Vec::new(),
            defines: HashMap::new(),
            max_depth: None,
            run_checks: true,
            waivers: HashSet::new(),
            profile: false,
            quiet: false,
        }
    }
}

/// Everything one run produced. `project` is `None` only when validation
/// found critical errors and left nothing safe to elaborate; a fatal
/// preprocessor, schema, or elaboration error instead surfaces as `Err`
/// from [`build_project`] itself.
pub struct BuildOutcome {
    pub project: Option<Project>,
    pub report: Report,
    pub violations: Vec<RuleViolation>,
    pub deps: DepFile,
}

pub fn build_project<F: FileReader>(opts: &BuildOptions<'_>, reader: &F) -> Result<BuildOutcome> {
    let mut report = Report::new();
    let mut deps = DepFile::new();
    let top_display = opts.top_file.display().to_string();

    let pp_result = {
        let span = info_span!("preprocess", file = %top_display);
        let _enter = span.enter();
        let started = Instant::now();
        let result = preprocessor::preprocess(opts.top_file, &opts.includes, &opts.defines, reader)
            .with_context(|| format!("failed preprocessing '{top_display}'"))?;
        log_stage(opts, "preprocess", started);
        result
    };
    deps.extend(pp_result.deps);
    deps.push(opts.top_file.to_path_buf());
    let source = pp_result.lines.join("\n");

    let records = {
        let span = info_span!("parse", file = %top_display);
        let _enter = span.enter();
        let started = Instant::now();
        let raw = schema::parser::parse_source(&source, &top_display)
            .with_context(|| format!("failed parsing preprocessed '{top_display}'"))?;
        let records = schema::builder::build_records(&raw)
            .with_context(|| format!("failed building schema records for '{top_display}'"))?;
        log_stage(opts, "parse", started);
        records
    };

    {
        let span = info_span!("validate", file = %top_display);
        let _enter = span.enter();
        let started = Instant::now();
        if let Err(errs) = validate::validate_all(&records) {
            for err in errs {
                report.error(&["validate"], err.to_string());
            }
            log_stage(opts, "validate", started);
            return Ok(BuildOutcome {
                project: None,
                report,
                violations: Vec::new(),
                deps,
            });
        }
        log_stage(opts, "validate", started);
    }

    let mut project = Project::new();
    {
        let span = info_span!("elaborate", top = %opts.top_name);
        let _enter = span.enter();
        let started = Instant::now();
        let input = elaborate::ElaborateInput {
            records: &records,
            top_name: opts.top_name,
            max_depth: opts.max_depth,
        };
        elaborate::elaborate(input, &mut project, &mut report)
            .with_context(|| format!("failed elaborating top module '{}'", opts.top_name))?;
        log_stage(opts, "elaborate", started);
    }

    let violations = if opts.run_checks {
        let span = info_span!("check");
        let _enter = span.enter();
        let started = Instant::now();
        let registry = Registry::with_builtins();
        let violations = registry
            .run(&project, &opts.waivers)
            .context("failed running rule checks")?;
        log_stage(opts, "check", started);
        violations
    } else {
        Vec::new()
    };

    Ok(BuildOutcome {
        project: Some(project),
        report,
        violations,
        deps,
    })
}

fn log_stage(opts: &BuildOptions<'_>, name: &str, started: Instant) {
    if opts.profile {
        info!(stage = name, elapsed_ms = started.elapsed().as_millis() as u64, "stage finished");
    } else if !opts.quiet {
        debug!(stage = name, "stage finished");
    }
}
