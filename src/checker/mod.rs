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

//! Rule checker: a pluggable registry of `check_*` functions run
//! against a finished `Project`. Recoverable violations accumulate and are
//! downgraded to warnings when a matching waiver hash is present; a
//! critical violation aborts the remaining checks.

use std::collections::HashMap;
use std::collections::HashSet;

use md5::{Digest, Md5};

use crate::errors::CheckerError;
use crate::graph::{AddressMapInitiator, AddressMapTarget, Block, NodeId, Project};
use crate::report::Severity;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleViolation {
    pub node_id: NodeId,
    pub node_kind: String,
    pub check_name: String,
    pub message: String,
    pub severity: Severity,
}

impl RuleViolation {
    pub fn new(node_id: NodeId, node_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id,
            node_kind: node_kind.into(),
            check_name: String::new(),
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Stable hash over `(node.id, node.kind, check_name, message)`, explicitly
/// excluding `attributes` (may carry system-local absolute paths) and any
/// derived fields, to keep the waiver-stability property.
pub fn hash_violation(v: &RuleViolation) -> String {
    let mut hasher = Md5::new();
    hasher.update(v.node_id.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(v.node_kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(v.check_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(v.message.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parses a waiver file: one hex hash per line, `#` starts a line comment,
/// blank lines ignored, duplicates idempotent (it's a set).
pub fn parse_waivers(text: &str) -> HashSet<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

pub type CheckFn = fn(&Project) -> Result<Vec<RuleViolation>, CheckerError>;

pub struct Registry {
    checks: Vec<(&'static str, CheckFn)>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    /// Rust has no runtime function scanning, so "scanning a conventional
    /// location" becomes an explicit built-in list here; callers
    /// may still `register` further checks before `run`.
    pub fn with_builtins() -> Self {
        Self {
            checks: vec![("check_register_aperture_reachability", check_register_aperture_reachability as CheckFn)],
        }
    }

    pub fn register(&mut self, name: &'static str, check: CheckFn) {
        self.checks.push((name, check));
    }

    pub fn run(&self, project: &Project, waivers: &HashSet<String>) -> Result<Vec<RuleViolation>, CheckerError> {
        let mut out = Vec::new();
        for (name, check) in &self.checks {
            for mut violation in check(project)? {
                violation.check_name = name.to_string();
                if waivers.contains(&hash_violation(&violation)) {
                    violation.severity = Severity::Warning;
                }
                out.push(violation);
            }
        }
        Ok(out)
    }
}

fn target_window(target: &AddressMapTarget) -> (i64, i64) {
    (target.offset, target.offset.saturating_add(target.aperture))
}

fn initiator_window(initiator: &AddressMapInitiator) -> (i64, i64) {
    match initiator.mask {
        Some(mask) if mask != 0 => (initiator.offset, initiator.offset.saturating_add(mask).saturating_add(1)),
        _ => (initiator.offset, i64::MAX),
    }
}

fn parent_of(project: &Project, block_id: NodeId) -> Option<&Block> {
    project.blocks.values().find(|b| b.children.contains(&block_id))
}

/// Built-in check: for every register, walk upward through
/// `AddressMap`s crossing each block boundary and confirm the register's
/// byte range lies within at least one target's aperture at its own block
/// and within every ancestor's inbound initiator window above that.
pub fn check_register_aperture_reachability(project: &Project) -> Result<Vec<RuleViolation>, CheckerError> {
    let mut violations = Vec::new();

    for block in project.blocks.values() {
        if block.register_groups.is_empty() {
            continue;
        }
        for group in &block.register_groups {
            for reg in &group.registers {
                let start = reg.addr;
                let end = reg.addr + reg.width_bytes;
                let mut window = (i64::MIN, i64::MAX);
                let mut current = block.id;
                let mut reachable = true;

                loop {
                    let Some(cur_block) = project.blocks.get(&current) else { break };
                    if let Some(map) = &cur_block.address_map {
                        if !map.targets.is_empty() {
                            let fits = map.targets.iter().any(|t| {
                                let (t_start, t_end) = target_window(t);
                                let lo = t_start.max(window.0);
                                let hi = t_end.min(window.1);
                                start >= lo && end <= hi
                            });
                            if !fits {
                                reachable = false;
                                break;
                            }
                        }
                    }
                    let Some(parent) = parent_of(project, current) else { break };
                    if let Some(parent_map) = &parent.address_map {
                        if let Some(init) = parent_map.initiators.first() {
                            let (i_start, i_end) = initiator_window(init);
                            window = (window.0.max(i_start), window.1.min(i_end));
                        }
                    }
                    current = parent.id;
                }

                if !reachable {
                    violations.push(RuleViolation::new(
                        reg.id,
                        "register",
                        format!("register '{}' is unreachable from an inbound aperture", reg.name),
                    ));
                }
            }
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AccessKind, AddressMap, Register, RegisterGroup};

    fn block_with_target(aperture: i64) -> (Project, NodeId) {
        let mut project = Project::new();
        let block_id = project.alloc_id();
        let reg_id = project.alloc_id();
        let reg1_id = project.alloc_id();
        let map_id = project.alloc_id();
        project.insert_block(Block {
            id: block_id,
            name: "b".to_string(),
            mod_type: "B".to_string(),
            source_file: "b.hw".to_string(),
            ports: vec![],
            children: vec![],
            register_groups: vec![RegisterGroup {
                id: 0,
                name: "scratch".to_string(),
                byte_mode: true,
                registers: vec![
                    Register {
                        id: reg_id,
                        name: "scratch_0".to_string(),
                        addr: 0x1C,
                        width_bytes: 4,
                        blockaccess: AccessKind::RW,
                        busaccess: AccessKind::RW,
                        instaccess: AccessKind::RW,
                        fields: vec![],
                        attributes: Default::default(),
                    },
                    Register {
                        id: reg1_id,
                        name: "scratch_1".to_string(),
                        addr: 0x20,
                        width_bytes: 4,
                        blockaccess: AccessKind::RW,
                        busaccess: AccessKind::RW,
                        instaccess: AccessKind::RW,
                        fields: vec![],
                        attributes: Default::default(),
                    },
                ],
                attributes: Default::default(),
            }],
            commands: vec![],
            address_map: Some(AddressMap {
                id: map_id,
                owner_block: block_id,
                initiators: vec![],
                targets: vec![AddressMapTarget {
                    id: 0,
                    port: 0,
                    signal_index: 0,
                    offset: 0,
                    aperture,
                    attributes: Default::default(),
                }],
                attributes: Default::default(),
            }),
            attributes: Default::default(),
        });
        (project, block_id)
    }

    #[test]
    fn register_past_aperture_is_flagged_unreachable() {
        let (project, _block_id) = block_with_target(0x20);
        let violations = check_register_aperture_reachability(&project).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("scratch_1"));
    }

    #[test]
    fn register_within_aperture_is_reachable() {
        let (project, _block_id) = block_with_target(0x28);
        let violations = check_register_aperture_reachability(&project).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn waiver_downgrades_violation_to_warning() {
        let (project, _block_id) = block_with_target(0x20);
        let registry = Registry::with_builtins();
        let unwaived = registry.run(&project, &HashSet::new()).unwrap();
        assert_eq!(unwaived[0].severity, Severity::Error);

        let hash = hash_violation(&unwaived[0]);
        let mut waivers = HashSet::new();
        waivers.insert(hash);
        let waived = registry.run(&project, &waivers).unwrap();
        assert_eq!(waived[0].severity, Severity::Warning);
    }

    #[test]
    fn waiver_file_parsing_ignores_comments_and_blanks() {
        let text = "# a comment\nabc123\n\ndef456 # trailing\n";
        let parsed = parse_waivers(text);
        assert!(parsed.contains("abc123"));
        assert!(parsed.contains("def456"));
        assert_eq!(parsed.len(), 2);
    }
}
