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

//! Interconnect elaborator: for each `His`, produces an [`Interconnect`]
//! with components in declaration order. `Port` components become simple
//! components with fixed width; `HisRef` components become complex
//! components linking to the referenced Interconnect. Net role of every
//! leaf signal is computed by walking the reference chain, flipping on
//! every slave-roled link.

use std::collections::{HashMap, HashSet};

use crate::errors::ElaborateError;
use crate::graph::{Interconnect, InterconnectComponent, NetRole, Project};
use crate::schema::{His, HisComponent, Role};

fn role_to_net(role: Role) -> NetRole {
    match role {
        Role::Master => NetRole::Master,
        Role::Slave => NetRole::Slave,
    }
}

/// Builds every named His into an Interconnect, rejecting cyclic
/// references. Returns the name -> graph-id map so later stages (module
/// ports) can resolve a HisRef's `type` attribute to a concrete
/// Interconnect.
pub fn elaborate_interconnects(
    his_records: &[&His],
    project: &mut Project,
) -> Result<HashMap<String, u64>, ElaborateError> {
    let by_name: HashMap<&str, &His> = his_records.iter().map(|h| (h.common.name.as_str(), *h)).collect();
    let mut built: HashMap<String, Interconnect> = HashMap::new();
    let mut visiting: HashSet<String> = HashSet::new();

    for his in his_records {
        build_one(his.common.name.as_str(), &by_name, &mut built, &mut visiting, false)?;
    }

    let mut ids = HashMap::new();
    for (name, ic) in built {
        let id = project.alloc_id();
        let mut ic = ic;
        ic.id = id;
        let id = project.insert_interconnect(ic);
        ids.insert(name, id);
    }
    Ok(ids)
}

fn build_one<'a>(
    name: &str,
    by_name: &HashMap<&'a str, &'a His>,
    built: &mut HashMap<String, Interconnect>,
    visiting: &mut HashSet<String>,
    invert: bool,
) -> Result<Interconnect, ElaborateError> {
    if let Some(existing) = built.get(name) {
        if !invert {
            return Ok(existing.clone());
        }
    }
    if visiting.contains(name) {
        return Err(ElaborateError::Cycle {
            chain: format!("his reference cycle at '{name}'"),
        });
    }
    let his = by_name.get(name).ok_or_else(|| ElaborateError::UndefinedReference {
        kind: "his".to_string(),
        name: name.to_string(),
    })?;
    visiting.insert(name.to_string());

    let mut components = Vec::new();
    for component in &his.components {
        match component {
            HisComponent::Port(port) => {
                let width = port.width.parse::<i64>().unwrap_or(1);
                let base_role = role_to_net(port.role);
                let net_role = if invert { base_role.flip() } else { base_role };
                components.push(InterconnectComponent {
                    id: 0,
                    name: port.common.name.clone(),
                    width,
                    net_role,
                    complex_ref: None,
                    enums: port.enums.iter().map(|e| (e.common.name.clone(), e.value, e.description.clone())).collect(),
                    attributes: Default::default(),
                });
            }
            HisComponent::HisRef(hisref) => {
                let flip_here = matches!(hisref.role, Role::Slave);
                let nested = build_one(&hisref.type_name, by_name, built, visiting, invert ^ flip_here)?;
                for nested_component in nested.components {
                    components.push(InterconnectComponent {
                        id: 0,
                        name: format!("{}.{}", hisref.common.name, nested_component.name),
                        width: nested_component.width,
                        net_role: nested_component.net_role,
                        complex_ref: None,
                        enums: nested_component.enums,
                        attributes: Default::default(),
                    });
                }
            }
        }
    }

    visiting.remove(name);
    let ic = Interconnect {
        id: 0,
        name: name.to_string(),
        components,
        attributes: Default::default(),
    };
    if !invert {
        built.insert(name.to_string(), ic.clone());
    }
    Ok(ic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Common, His, HisComponent, HisRef, Port, Role};

    fn common(name: &str) -> Common {
        Common {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn simple_his_with_ports() {
        let his = His {
            common: common("bus"),
            components: vec![HisComponent::Port(Port {
                common: common("data"),
                width: "8".to_string(),
                count: "1".to_string(),
                default: None,
                role: Role::Master,
                enums: vec![],
            })],
        };
        let mut project = Project::new();
        let refs = vec![&his];
        let ids = elaborate_interconnects(&refs, &mut project).unwrap();
        let ic = &project.interconnects[&ids["bus"]];
        assert_eq!(ic.components.len(), 1);
        assert_eq!(ic.components[0].width, 8);
        assert_eq!(ic.components[0].net_role, NetRole::Master);
    }

    #[test]
    fn slave_hisref_flips_role() {
        let inner = His {
            common: common("inner"),
            components: vec![HisComponent::Port(Port {
                common: common("sig"),
                width: "1".to_string(),
                count: "1".to_string(),
                default: None,
                role: Role::Master,
                enums: vec![],
            })],
        };
        let outer = His {
            common: common("outer"),
            components: vec![HisComponent::HisRef(HisRef {
                common: common("child"),
                type_name: "inner".to_string(),
                count: "1".to_string(),
                role: Role::Slave,
            })],
        };
        let mut project = Project::new();
        let refs = vec![&inner, &outer];
        let ids = elaborate_interconnects(&refs, &mut project).unwrap();
        let ic = &project.interconnects[&ids["outer"]];
        assert_eq!(ic.components[0].net_role, NetRole::Slave);
    }

    #[test]
    fn cyclic_his_is_rejected() {
        let a = His {
            common: common("a"),
            components: vec![HisComponent::HisRef(HisRef {
                common: common("b_ref"),
                type_name: "b".to_string(),
                count: "1".to_string(),
                role: Role::Master,
            })],
        };
        let b = His {
            common: common("b"),
            components: vec![HisComponent::HisRef(HisRef {
                common: common("a_ref"),
                type_name: "a".to_string(),
                count: "1".to_string(),
                role: Role::Master,
            })],
        };
        let mut project = Project::new();
        let refs = vec![&a, &b];
        let result = elaborate_interconnects(&refs, &mut project);
        assert!(matches!(result, Err(ElaborateError::Cycle { .. })));
    }
}
