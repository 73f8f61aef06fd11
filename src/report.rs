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

//! Structured diagnostics accumulated across the pipeline.
//!
//! Warnings never abort a stage; they are collected here and returned
//! alongside the design graph from [`crate::build_project`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single diagnostic entry, attached to an optional node and a slash
/// separated category path (e.g. `module/connect/unconnected-port`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Vec<String>,
    pub message: String,
    pub node_id: Option<u64>,
}

impl Diagnostic {
    pub fn new(severity: Severity, category: &[&str], message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.iter().map(|s| s.to_string()).collect(),
            message: message.into(),
            node_id: None,
        }
    }

    pub fn with_node(mut self, node_id: u64) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn category_path(&self) -> String {
        self.category.join("/")
    }
}

/// Accumulator for diagnostics produced by every stage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Report {
    entries: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn warn(&mut self, category: &[&str], message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Warning, category, message));
    }

    pub fn info(&mut self, category: &[&str], message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Info, category, message));
    }

    pub fn error(&mut self, category: &[&str], message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Error, category, message));
    }

    pub fn extend(&mut self, other: Report) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
