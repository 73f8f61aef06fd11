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

//! Source access abstraction for the preprocessor.
//!
//! Every source file the preprocessor touches is read through this trait so
//! that includes-search-path resolution and recursive evaluation can be
//! exercised with an in-memory [`MockFileReader`] in tests, the way the
//! teacher separates `AsmFileReader` from `MockFileReader`.

use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait FileReader {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Returns `true` if `path` exists and can be read by this reader.
    fn exists(&self, path: &Path) -> bool;
}

/// Production file reader, backed by the real filesystem.
pub struct OsFileReader;

impl FileReader for OsFileReader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory file reader for unit and integration tests.
#[derive(Default, Clone)]
pub struct MockFileReader {
    files: HashMap<PathBuf, String>,
}

impl MockFileReader {
    pub fn add_file(&mut self, path: &str, content: &str) {
        self.files
            .insert(PathBuf::from(path), content.to_string());
    }
}

impl FileReader for MockFileReader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("mock file not found: {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Resolves `name` against an ordered list of search-path entries the way
/// `includes` entries (directories or explicit file paths) are consulted
/// for `#include` and for `Mod`-type lookups.
pub fn resolve_in_search_path<F: FileReader>(
    reader: &F,
    search_path: &[PathBuf],
    name: &str,
) -> Option<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_absolute() && reader.exists(&direct) {
        return Some(direct);
    }
    for entry in search_path {
        let candidate = entry.join(name);
        if reader.exists(&candidate) {
            return Some(candidate);
        }
    }
    None
}
