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

//! Address-map elaborator: resolves a block's `Initiator`/`Target`
//! boundary ports into an `AddressMap`. Ports named on a child block are
//! rejected — address distribution is modeled only at the block that owns
//! the port, never reached through into a descendant.

use std::collections::HashMap;

use crate::errors::ElaborateError;
use crate::graph::{AddressMap, AddressMapInitiator, AddressMapTarget, NodeId, Project};
use crate::schema::{Mod, Point};

fn resolve_own_point(project: &Project, own_block: NodeId, point: &Point) -> Option<(NodeId, i64)> {
    if point.module.is_some() {
        return None;
    }
    let block = project.blocks.get(&own_block)?;
    let port_id = block
        .ports
        .iter()
        .find(|pid| project.ports[pid].name == point.port)
        .copied()?;
    let port = &project.ports[&port_id];
    let idx = point
        .signal_index
        .as_ref()
        .and_then(|e| e.parse::<i64>().ok())
        .unwrap_or(0);
    if idx < 0 || idx >= port.count.max(1) {
        return None;
    }
    Some((port_id, idx))
}

fn constraint_names(project: &Project, own_block: NodeId, points: &[Point]) -> Result<Vec<String>, ElaborateError> {
    let mut names = Vec::new();
    for point in points {
        resolve_own_point(project, own_block, point).ok_or_else(|| ElaborateError::UndefinedReference {
            kind: "point".to_string(),
            name: point.port.clone(),
        })?;
        names.push(point.port.clone());
    }
    Ok(names)
}

/// Builds the `AddressMap` for one block from its owning `Mod`'s
/// `initiators`/`targets` lists. A no-op when both are
/// empty.
pub fn elaborate_address_map(mod_def: &Mod, own_block: NodeId, project: &mut Project) -> Result<(), ElaborateError> {
    if mod_def.initiators.is_empty() && mod_def.targets.is_empty() {
        return Ok(());
    }

    let mut initiators = Vec::new();
    for init in &mod_def.initiators {
        let (port_id, idx) = resolve_own_point(project, own_block, &init.point).ok_or_else(|| ElaborateError::UndefinedReference {
            kind: "initiator".to_string(),
            name: init.point.port.clone(),
        })?;
        let constraints = constraint_names(project, own_block, &init.constraints)?;
        let mut attributes: HashMap<String, String> = Default::default();
        if !constraints.is_empty() {
            attributes.insert("constraints".to_string(), constraints.join(","));
        }
        initiators.push(AddressMapInitiator {
            id: project.alloc_id(),
            port: port_id,
            signal_index: idx,
            mask: init.mask.as_ref().and_then(|e| e.parse::<i64>().ok()),
            offset: init.offset.parse().unwrap_or(0),
            attributes,
        });
    }

    let mut targets = Vec::new();
    for tgt in &mod_def.targets {
        let (port_id, idx) = resolve_own_point(project, own_block, &tgt.point).ok_or_else(|| ElaborateError::UndefinedReference {
            kind: "target".to_string(),
            name: tgt.point.port.clone(),
        })?;
        let constraints = constraint_names(project, own_block, &tgt.constraints)?;
        let mut attributes: HashMap<String, String> = Default::default();
        if !constraints.is_empty() {
            attributes.insert("constraints".to_string(), constraints.join(","));
        }
        targets.push(AddressMapTarget {
            id: project.alloc_id(),
            port: port_id,
            signal_index: idx,
            offset: tgt.offset.parse().unwrap_or(0),
            aperture: tgt.aperture.parse().unwrap_or(0),
            attributes,
        });
    }

    let map_id = project.alloc_id();
    if let Some(block) = project.blocks.get_mut(&own_block) {
        block.address_map = Some(AddressMap {
            id: map_id,
            owner_block: own_block,
            initiators,
            targets,
            attributes: Default::default(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Block, Port, PortRole};
    use crate::schema::{Common, Initiator, Target};

    fn common(name: &str) -> Common {
        Common {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn point(port: &str) -> Point {
        Point {
            common: common("pt"),
            port: port.to_string(),
            module: None,
            signal_index: None,
        }
    }

    fn test_block(project: &mut Project, port_names: &[&str]) -> NodeId {
        let block_id = project.alloc_id();
        let mut ports = Vec::new();
        for name in port_names {
            let port_id = project.alloc_id();
            project.insert_port(Port {
                id: port_id,
                name: name.to_string(),
                owner_block: block_id,
                interconnect: 0,
                count: 1,
                role: PortRole::Slave,
                is_principal_clk: false,
                is_principal_rst: false,
                connected_signals: vec![true],
                attributes: Default::default(),
            });
            ports.push(port_id);
        }
        project.insert_block(Block {
            id: block_id,
            name: "b".to_string(),
            mod_type: "B".to_string(),
            source_file: "b.hw".to_string(),
            ports,
            children: vec![],
            register_groups: vec![],
            commands: vec![],
            address_map: None,
            attributes: Default::default(),
        });
        block_id
    }

    #[test]
    fn resolves_initiator_and_target_onto_own_ports() {
        let mut project = Project::new();
        let block_id = test_block(&mut project, &["bus_init", "bus_tgt"]);
        let mod_def = Mod {
            common: common("B"),
            ports: vec![],
            modules: vec![],
            connections: vec![],
            defaults: vec![],
            clk_root: None,
            rst_root: None,
            initiators: vec![Initiator {
                common: common("init"),
                point: point("bus_init"),
                mask: Some("0xFF".to_string()),
                offset: "0".to_string(),
                constraints: vec![],
            }],
            targets: vec![Target {
                common: common("tgt"),
                point: point("bus_tgt"),
                offset: "0".to_string(),
                aperture: "0x20".to_string(),
                constraints: vec![],
            }],
        };
        elaborate_address_map(&mod_def, block_id, &mut project).unwrap();
        let map = project.blocks[&block_id].address_map.as_ref().unwrap();
        assert_eq!(map.initiators.len(), 1);
        assert_eq!(map.targets[0].aperture, 0x20);
    }

    #[test]
    fn child_named_port_is_rejected() {
        let mut project = Project::new();
        let block_id = test_block(&mut project, &["bus_tgt"]);
        let mod_def = Mod {
            common: common("B"),
            ports: vec![],
            modules: vec![],
            connections: vec![],
            defaults: vec![],
            clk_root: None,
            rst_root: None,
            initiators: vec![],
            targets: vec![Target {
                common: common("tgt"),
                point: Point {
                    common: common("pt"),
                    port: "bus_tgt".to_string(),
                    module: Some("child".to_string()),
                    signal_index: None,
                },
                offset: "0".to_string(),
                aperture: "0x20".to_string(),
                constraints: vec![],
            }],
        };
        let err = elaborate_address_map(&mod_def, block_id, &mut project).unwrap_err();
        assert!(matches!(err, ElaborateError::UndefinedReference { .. }));
    }
}
