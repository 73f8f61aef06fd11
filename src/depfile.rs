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

//! Dependency file collector: records every file opened by the
//! preprocessor or parser and formats a Make-style rule on request.
//! Writing the rule to disk is a CLI boundary concern; this module only
//! owns the collection and formatting.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct DepFile {
    paths: Vec<PathBuf>,
}

impl DepFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            self.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// `<target>: <file1> <file2> …`.
    pub fn format_rule(&self, target: &Path) -> String {
        let files: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("{}: {}", target.display(), files.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rule_lists_every_dependency() {
        let mut deps = DepFile::new();
        deps.push(PathBuf::from("a.hw"));
        deps.push(PathBuf::from("b.hw"));
        assert_eq!(deps.format_rule(Path::new("out.json")), "out.json: a.hw b.hw");
    }

    #[test]
    fn push_is_idempotent() {
        let mut deps = DepFile::new();
        deps.push(PathBuf::from("a.hw"));
        deps.push(PathBuf::from("a.hw"));
        assert_eq!(deps.paths().len(), 1);
    }
}
