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

//! Stage orchestration: wires the interconnect, define,
//! module, register and instruction elaborators together into one
//! `Project`, in the dependency order the pipeline requires (interconnects and
//! defines are inputs to module elaboration; the address map is run
//! per-block inside module elaboration itself; registers and commands are
//! attached to the already-built top block last).

pub mod addressmap;
pub mod defines;
pub mod instructions;
pub mod interconnect;
pub mod module;
pub mod registers;

use crate::errors::ElaborateError;
use crate::graph::{NodeId, Project};
use crate::report::Report;
use crate::schema::{Config, Def, Define, Group, His, Inst, Mod, SchemaRecord};

use module::ModuleElaborator;

pub struct ElaborateInput<'a> {
    pub records: &'a [SchemaRecord],
    pub top_name: &'a str,
    pub max_depth: Option<usize>,
}

/// Runs every elaboration stage and returns the id of the top `Block`.
///
/// Register/instruction descriptions `#include`d alongside a `Mod` are
/// schema-level top-level records with no nesting link back to that `Mod`
/// belong to; since preprocessing flattens every included file into one text
/// stream before parsing, there is no per-physical-file boundary left to
/// key off downstream of `schema::parse_file`. This implementation
/// therefore attaches every `Config`/`Group` register description and
/// every `Inst` command found in the same `build_project` invocation to
/// the run's single top block — the realistic granularity is one
/// `build_project` call per leaf design unit, each `#include`ing its own
/// register/instruction description alongside its `Mod` (see DESIGN.md).
pub fn elaborate(input: ElaborateInput<'_>, project: &mut Project, report: &mut Report) -> Result<NodeId, ElaborateError> {
    let defs: Vec<&Def> = input.records.iter().filter_map(as_def).collect();
    let hises: Vec<&His> = input.records.iter().filter_map(as_his).collect();
    let mods: Vec<&Mod> = input.records.iter().filter_map(as_mod).collect();
    let groups: Vec<&Group> = input.records.iter().filter_map(as_group).collect();
    let configs: Vec<&Config> = input.records.iter().filter_map(as_config).collect();
    let defines: Vec<&Define> = input.records.iter().filter_map(as_define).collect();
    let insts: Vec<&Inst> = input.records.iter().filter_map(as_inst).collect();

    defines::resolve_defines(&defs, project)?;

    let interconnect_ids = interconnect::elaborate_interconnects(&hises, project)?;

    let mod_registry = module::build_mod_registry(&mods);
    let top = module::find_top(&mods, input.top_name).ok_or_else(|| ElaborateError::UndefinedReference {
        kind: "mod".to_string(),
        name: input.top_name.to_string(),
    })?;

    let top_id = {
        let mut elaborator = ModuleElaborator {
            mods: mod_registry,
            interconnects: interconnect_ids,
            project,
            report,
            max_depth: input.max_depth,
        };
        elaborator.elaborate_top(top)?
    };

    if !groups.is_empty() || !configs.is_empty() {
        let config = configs.first().copied();
        let mut register_groups = registers::elaborate_registers(&groups, config, &defines, report)?;
        for group in register_groups.iter_mut() {
            group.id = project.alloc_id();
            for reg in group.registers.iter_mut() {
                reg.id = project.alloc_id();
                for field in reg.fields.iter_mut() {
                    field.id = project.alloc_id();
                }
            }
        }
        if let Some(block) = project.blocks.get_mut(&top_id) {
            block.register_groups.extend(register_groups);
        }
    }

    if !insts.is_empty() {
        let mut commands = instructions::elaborate_instructions(&insts)?;
        for (_, command) in commands.iter_mut() {
            command.id = project.alloc_id();
            for field in command.fields.iter_mut() {
                field.id = project.alloc_id();
            }
        }
        if let Some(block) = project.blocks.get_mut(&top_id) {
            for (_, command) in commands {
                block.commands.push(command);
            }
        }
    }

    Ok(top_id)
}

fn as_def(r: &SchemaRecord) -> Option<&Def> {
    if let SchemaRecord::Def(d) = r { Some(d) } else { None }
}
fn as_his(r: &SchemaRecord) -> Option<&His> {
    if let SchemaRecord::His(h) = r { Some(h) } else { None }
}
fn as_mod(r: &SchemaRecord) -> Option<&Mod> {
    if let SchemaRecord::Mod(m) = r { Some(m) } else { None }
}
fn as_group(r: &SchemaRecord) -> Option<&Group> {
    if let SchemaRecord::Group(g) = r { Some(g) } else { None }
}
fn as_config(r: &SchemaRecord) -> Option<&Config> {
    if let SchemaRecord::Config(c) = r { Some(c) } else { None }
}
fn as_define(r: &SchemaRecord) -> Option<&Define> {
    if let SchemaRecord::Define(d) = r { Some(d) } else { None }
}
fn as_inst(r: &SchemaRecord) -> Option<&Inst> {
    if let SchemaRecord::Inst(i) = r { Some(i) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builder::build_records;
    use crate::schema::parser::parse_source;

    fn parse(src: &str) -> Vec<SchemaRecord> {
        let raw = parse_source(src, "top.hw").unwrap();
        build_records(&raw).unwrap()
    }

    #[test]
    fn empty_module_with_no_clk_rst_elaborates_without_warnings() {
        let records = parse("mod Top { options: [NO_CLK_RST] }");
        let mut project = Project::new();
        let mut report = Report::new();
        let input = ElaborateInput {
            records: &records,
            top_name: "Top",
            max_depth: None,
        };
        let top_id = elaborate(input, &mut project, &mut report).unwrap();
        assert!(project.blocks[&top_id].ports.is_empty());
        assert!(report.entries().is_empty());
    }

    #[test]
    fn register_group_attaches_to_top_block() {
        let records = parse(
            "mod Top { options: [NO_CLK_RST] }\n\
             group G { reg R { addr: 0, width: 32 } }",
        );
        let mut project = Project::new();
        let mut report = Report::new();
        let input = ElaborateInput {
            records: &records,
            top_name: "Top",
            max_depth: None,
        };
        let top_id = elaborate(input, &mut project, &mut report).unwrap();
        assert_eq!(project.blocks[&top_id].register_groups.len(), 1);
        assert_eq!(project.blocks[&top_id].register_groups[0].registers[0].name, "R");
    }
}
