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

//! Instruction elaborator: collapses an `Inst`'s `extends` chain
//! into an ordered `Command`/`CommandField` layout, honoring one fixed
//! field per inheritance level and marking inherited fields.

use std::collections::{HashMap, HashSet};

use crate::errors::ElaborateError;
use crate::graph::{Command, CommandField};
use crate::schema::{Enum, Field, Inst};

fn collapse_chain<'a>(name: &str, by_name: &HashMap<&str, &'a Inst>) -> Result<Vec<&'a Inst>, ElaborateError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = name.to_string();
    loop {
        if !seen.insert(current.clone()) {
            return Err(ElaborateError::Cycle {
                chain: format!("inst inheritance cycle at '{current}'"),
            });
        }
        let inst = *by_name.get(current.as_str()).ok_or_else(|| ElaborateError::UndefinedReference {
            kind: "inst".to_string(),
            name: current.clone(),
        })?;
        chain.push(inst);
        match &inst.extends {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }
    chain.reverse();
    Ok(chain)
}

fn resolve_fixed_value(value_name: &str, enums: &[Enum]) -> Option<i64> {
    if let Ok(v) = value_name.parse::<i64>() {
        return Some(v);
    }
    enums.iter().find(|e| e.common.name == value_name).map(|e| e.value)
}

fn place_command_fields(inst_name: &str, ordered_fields: &[(Field, bool)]) -> Result<Vec<CommandField>, ElaborateError> {
    let mut placed: Vec<CommandField> = Vec::new();
    let mut cursor = 0i64;
    for (field, inherited) in ordered_fields {
        let width: i64 = field.width.parse().unwrap_or(1);
        let lsb = field.lsb.as_ref().and_then(|l| l.parse().ok()).unwrap_or(cursor);
        let msb = field.msb.as_ref().and_then(|m| m.parse().ok()).unwrap_or(lsb + width - 1);
        for existing in &placed {
            if lsb <= existing.msb && existing.lsb <= msb {
                return Err(ElaborateError::FieldOverlap {
                    reg: inst_name.to_string(),
                    a: existing.name.clone(),
                    b: field.common.name.clone(),
                });
            }
        }
        placed.push(CommandField {
            id: 0,
            name: field.common.name.clone(),
            lsb,
            msb,
            fixed_value: None,
            inherited: *inherited,
            attributes: Default::default(),
        });
        cursor = msb + 1;
    }
    Ok(placed)
}

/// Collapses every `Inst`'s inheritance chain into a `Command`, returning
/// it alongside the source file it came from so the caller can attach it
/// to the `Block` sharing that file scope.
pub fn elaborate_instructions(insts: &[&Inst]) -> Result<Vec<(String, Command)>, ElaborateError> {
    let by_name: HashMap<&str, &Inst> = insts.iter().map(|i| (i.common.name.as_str(), *i)).collect();
    let mut out = Vec::new();

    for inst in insts {
        let chain = collapse_chain(&inst.common.name, &by_name)?;
        let mut ordered_fields: Vec<(Field, bool)> = Vec::new();
        let mut fixed_values: HashMap<String, i64> = HashMap::new();

        for (level_idx, level_inst) in chain.iter().enumerate() {
            let inherited = level_idx + 1 < chain.len();
            for field in &level_inst.fields {
                ordered_fields.push((field.clone(), inherited));
            }
            if let Some((field_name, value_name)) = &level_inst.fixed_field {
                let enums = ordered_fields
                    .iter()
                    .find(|(f, _)| &f.common.name == field_name)
                    .map(|(f, _)| f.enums.clone())
                    .unwrap_or_default();
                if let Some(value) = resolve_fixed_value(value_name, &enums) {
                    fixed_values.insert(field_name.clone(), value);
                }
            }
        }

        let mut command_fields = place_command_fields(&inst.common.name, &ordered_fields)?;
        for cf in command_fields.iter_mut() {
            if let Some(value) = fixed_values.get(&cf.name) {
                cf.fixed_value = Some(*value);
            }
        }

        let mut attributes: HashMap<String, String> = Default::default();
        for opt in &inst.common.options {
            attributes.insert(opt.clone(), "true".to_string());
        }

        out.push((
            inst.common.source_file.clone(),
            Command {
                id: 0,
                name: inst.common.name.clone(),
                fields: command_fields,
                attributes,
            },
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Common;

    fn common(name: &str, file: &str) -> Common {
        Common {
            name: name.to_string(),
            source_file: file.to_string(),
            ..Default::default()
        }
    }

    fn field(name: &str, width: &str, lsb: Option<&str>, msb: Option<&str>) -> Field {
        Field {
            common: common(name, "i.hw"),
            width: width.to_string(),
            lsb: lsb.map(|s| s.to_string()),
            msb: msb.map(|s| s.to_string()),
            signed: false,
            reset: "0".to_string(),
            enums: vec![],
        }
    }

    #[test]
    fn leaf_inherits_ancestor_fields_in_order() {
        let base = Inst {
            common: common("base", "i.hw"),
            extends: None,
            fixed_field: None,
            fields: vec![field("opcode", "4", Some("0"), Some("3"))],
        };
        let leaf = Inst {
            common: common("add", "i.hw"),
            extends: Some("base".to_string()),
            fixed_field: None,
            fields: vec![field("operand", "4", Some("4"), Some("7"))],
        };
        let insts = vec![&base, &leaf];
        let commands = elaborate_instructions(&insts).unwrap();
        let add = commands.iter().find(|(_, c)| c.name == "add").unwrap();
        assert_eq!(add.1.fields.len(), 2);
        assert!(add.1.fields[0].inherited);
        assert!(!add.1.fields[1].inherited);
    }

    #[test]
    fn overlapping_fields_are_rejected() {
        let inst = Inst {
            common: common("bad", "i.hw"),
            extends: None,
            fixed_field: None,
            fields: vec![
                field("a", "4", Some("0"), Some("3")),
                field("b", "4", Some("2"), Some("5")),
            ],
        };
        let insts = vec![&inst];
        let err = elaborate_instructions(&insts).unwrap_err();
        assert!(matches!(err, ElaborateError::FieldOverlap { .. }));
    }

    #[test]
    fn fixed_field_resolves_enum_value() {
        let mut opcode = field("opcode", "4", Some("0"), Some("3"));
        opcode.enums = vec![Enum {
            common: common("ADD", "i.hw"),
            value: 1,
            description: String::new(),
        }];
        let inst = Inst {
            common: common("add", "i.hw"),
            extends: None,
            fixed_field: Some(("opcode".to_string(), "ADD".to_string())),
            fields: vec![opcode],
        };
        let insts = vec![&inst];
        let commands = elaborate_instructions(&insts).unwrap();
        assert_eq!(commands[0].1.fields[0].fixed_value, Some(1));
    }

    #[test]
    fn cyclic_extends_is_rejected() {
        let a = Inst {
            common: common("a", "i.hw"),
            extends: Some("b".to_string()),
            fixed_field: None,
            fields: vec![],
        };
        let b = Inst {
            common: common("b", "i.hw"),
            extends: Some("a".to_string()),
            fixed_field: None,
            fields: vec![],
        };
        let insts = vec![&a, &b];
        let err = elaborate_instructions(&insts).unwrap_err();
        assert!(matches!(err, ElaborateError::Cycle { .. }));
    }
}
