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

//! Module elaborator: expands one `Mod` (and, recursively, the `Mod`s its
//! `ModInst`s reference) into a `Block` tree, resolving explicit
//! connections, distributing clock/reset, and running the two-pass
//! implicit-connection inference described for leftover ports.

use std::collections::{HashMap, HashSet};

use crate::errors::ElaborateError;
use crate::graph::{Block, Connection, DriveSource, NetRole, NodeId, Port, PortRole, Project};
use crate::report::Report;
use crate::schema::{Connect, Mod, Point, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Initiator,
    Target,
}

pub struct ModuleElaborator<'a> {
    pub mods: HashMap<String, &'a Mod>,
    pub interconnects: HashMap<String, NodeId>,
    pub project: &'a mut Project,
    pub report: &'a mut Report,
    pub max_depth: Option<usize>,
}

impl<'a> ModuleElaborator<'a> {
    fn get_or_create_builtin_interconnect(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.interconnects.get(name) {
            return *id;
        }
        let id = self.project.alloc_id();
        let ic = crate::graph::Interconnect {
            id,
            name: name.to_string(),
            components: vec![crate::graph::InterconnectComponent {
                id: 0,
                name: "sig".to_string(),
                width: 1,
                net_role: NetRole::Master,
                complex_ref: None,
                enums: vec![],
                attributes: Default::default(),
            }],
            attributes: Default::default(),
        };
        self.project.insert_interconnect(ic);
        self.interconnects.insert(name.to_string(), id);
        id
    }

    fn port_role(role: Role) -> PortRole {
        match role {
            Role::Master => PortRole::Master,
            Role::Slave => PortRole::Slave,
        }
    }

    /// Own-port-vs-child-port and declared role jointly determine whether a
    /// port behaves as a net initiator or net target from inside the
    /// block: an own slave-roled port is driven from outside and so acts
    /// as an internal source; a child master-roled port drives outward.
    fn direction_of(is_own: bool, role: PortRole) -> Direction {
        match (is_own, role) {
            (true, PortRole::Slave) => Direction::Initiator,
            (true, PortRole::Master) => Direction::Target,
            (false, PortRole::Master) => Direction::Initiator,
            (false, PortRole::Slave) => Direction::Target,
        }
    }

    pub fn elaborate_top(&mut self, mod_def: &'a Mod) -> Result<NodeId, ElaborateError> {
        self.elaborate_block(mod_def, &mod_def.common.name, 0, false)
    }

    fn elaborate_block(
        &mut self,
        mod_def: &'a Mod,
        instance_name: &str,
        depth: usize,
        shallow: bool,
    ) -> Result<NodeId, ElaborateError> {
        let block_id = self.project.alloc_id();
        let mut block = Block {
            id: block_id,
            name: instance_name.to_string(),
            mod_type: mod_def.common.name.clone(),
            source_file: mod_def.common.source_file.clone(),
            ports: Vec::new(),
            children: Vec::new(),
            register_groups: Vec::new(),
            commands: Vec::new(),
            address_map: None,
            attributes: Default::default(),
        };

        // Step 2: boundary ports.
        for hisref in &mod_def.ports {
            let ic_id = *self.interconnects.get(&hisref.type_name).ok_or_else(|| ElaborateError::UndefinedReference {
                kind: "his".to_string(),
                name: hisref.type_name.clone(),
            })?;
            let count: i64 = hisref.count.parse().unwrap_or(1);
            let port_id = self.project.alloc_id();
            let port = Port {
                id: port_id,
                name: hisref.common.name.clone(),
                owner_block: block_id,
                interconnect: ic_id,
                count,
                role: Self::port_role(hisref.role),
                is_principal_clk: false,
                is_principal_rst: false,
                connected_signals: vec![false; count.max(1) as usize],
                attributes: Default::default(),
            };
            self.project.insert_port(port);
            block.ports.push(port_id);
        }

        // Step 3: inject clk/rst unless suppressed.
        let suppress_clk_rst = mod_def.common.options.contains("NO_CLK_RST")
            || mod_def.common.options.contains("NO_AUTO_CLK_RST");
        if !suppress_clk_rst {
            let clk_ic = self.get_or_create_builtin_interconnect("clock");
            let rst_ic = self.get_or_create_builtin_interconnect("reset");
            for (name, ic, is_clk) in [("clk", clk_ic, true), ("rst", rst_ic, false)] {
                let port_id = self.project.alloc_id();
                let port = Port {
                    id: port_id,
                    name: name.to_string(),
                    owner_block: block_id,
                    interconnect: ic,
                    count: 1,
                    role: PortRole::Slave,
                    is_principal_clk: is_clk,
                    is_principal_rst: !is_clk,
                    connected_signals: vec![false],
                    attributes: Default::default(),
                };
                self.project.insert_port(port);
                block.ports.push(port_id);
            }
        } else {
            // Step 4: nominate principals from AUTO_CLK/AUTO_RST options.
            for (hisref, port_id) in mod_def.ports.iter().zip(block.ports.iter().copied()) {
                if hisref.common.options.contains("AUTO_CLK") {
                    if let Some(p) = self.project.ports.get_mut(&port_id) {
                        p.is_principal_clk = true;
                    }
                }
                if hisref.common.options.contains("AUTO_RST") {
                    if let Some(p) = self.project.ports.get_mut(&port_id) {
                        p.is_principal_rst = true;
                    }
                }
            }
        }

        self.project.insert_block(block);

        if shallow {
            return Ok(block_id);
        }

        // Step 5: expand children.
        let next_depth = depth + 1;
        let depth_cutoff = self.max_depth.map(|d| next_depth > d).unwrap_or(false);
        let mut child_ids: Vec<NodeId> = Vec::new();
        for modinst in &mod_def.modules {
            let child_def = *self.mods.get(&modinst.mod_type).ok_or_else(|| ElaborateError::UndefinedReference {
                kind: "mod".to_string(),
                name: modinst.mod_type.clone(),
            })?;
            let count: i64 = modinst.count.parse().unwrap_or(1);
            for i in 0..count.max(1) {
                let name = if count > 1 {
                    format!("{}_{i}", modinst.instance_name)
                } else {
                    modinst.instance_name.clone()
                };
                let child_id = self.elaborate_block(child_def, &name, next_depth, depth_cutoff)?;
                child_ids.push(child_id);
            }
        }
        if let Some(block) = self.project.blocks.get_mut(&block_id) {
            block.children = child_ids.clone();
        }

        if depth_cutoff {
            return Ok(block_id);
        }

        let mut touched: HashSet<(NodeId, i64)> = HashSet::new();

        // Step 6: explicit connections.
        for connect in &mod_def.connections {
            self.elaborate_connect(block_id, connect, &mut touched)?;
        }

        // Step 7: automatic clock/reset distribution.
        self.distribute_clk_rst(mod_def, block_id, &child_ids)?;

        // Steps 8-9: implicit inference, strict then relaxed.
        self.infer_implicit(block_id, &child_ids, &touched, true)?;
        self.infer_implicit(block_id, &child_ids, &touched, false)?;

        // Step 10-11: defaults/warnings.
        let defaults: HashSet<String> = mod_def.defaults.iter().map(|p| p.port.clone()).collect();
        self.warn_unconnected(block_id, &child_ids, &defaults);

        // Step 13: address map.
        if !mod_def.initiators.is_empty() || !mod_def.targets.is_empty() {
            crate::elaborate::addressmap::elaborate_address_map(mod_def, block_id, self.project)?;
        }

        Ok(block_id)
    }

    fn resolve_point(&self, own_block: NodeId, child_ids: &[NodeId], point: &Point) -> Option<(NodeId, bool)> {
        let owner = match &point.module {
            None => own_block,
            Some(name) => {
                let block = self.project.blocks.values().find(|b| &b.name == name && child_ids.contains(&b.id))?;
                block.id
            }
        };
        let port_id = self
            .project
            .blocks
            .get(&owner)?
            .ports
            .iter()
            .find(|pid| self.project.ports.get(pid).map(|p| p.name == point.port).unwrap_or(false))
            .copied()?;
        Some((port_id, point.module.is_none()))
    }

    fn flatten_point(&self, own_block: NodeId, child_ids: &[NodeId], point: &Point) -> Option<(NodeId, bool, Vec<i64>)> {
        let (port_id, is_own) = self.resolve_point(own_block, child_ids, point)?;
        let port = self.project.ports.get(&port_id)?;
        let indices = match &point.signal_index {
            Some(expr) => vec![expr.parse::<i64>().unwrap_or(0)],
            None => (0..port.count.max(1)).collect(),
        };
        Some((port_id, is_own, indices))
    }

    fn elaborate_connect(
        &mut self,
        own_block: NodeId,
        connect: &Connect,
        touched: &mut HashSet<(NodeId, i64)>,
    ) -> Result<(), ElaborateError> {
        let mut child_ids = Vec::new();
        if let Some(block) = self.project.blocks.get(&own_block) {
            child_ids = block.children.clone();
        }

        let mut initiator_points = Vec::new();
        let mut target_points = Vec::new();

        for point in &connect.points {
            let Some((port_id, is_own, indices)) = self.flatten_point(own_block, &child_ids, point) else {
                return Err(ElaborateError::UndefinedReference {
                    kind: "point".to_string(),
                    name: point.port.clone(),
                });
            };
            let role = self.project.ports[&port_id].role;
            match Self::direction_of(is_own, role) {
                Direction::Initiator => initiator_points.push((port_id, indices)),
                Direction::Target => target_points.push((port_id, indices)),
            }
        }

        let mut initiator_signals: Vec<(NodeId, i64)> = Vec::new();
        for (pid, indices) in &initiator_points {
            for idx in indices {
                initiator_signals.push((*pid, *idx));
            }
        }
        if let Some(constant) = &connect.constant {
            let _ = constant;
            initiator_signals.push((0, -1));
        }

        let mut target_signals: Vec<(NodeId, i64)> = Vec::new();
        for (pid, indices) in &target_points {
            for idx in indices {
                target_signals.push((*pid, *idx));
            }
        }

        if initiator_points.len() > 1 && target_points.len() > 1 && initiator_signals.len() != target_signals.len() {
            return Err(ElaborateError::AmbiguousConnection {
                reason: format!(
                    "{} initiator points and {} target points with unequal total signal counts",
                    initiator_points.len(),
                    target_points.len()
                ),
            });
        }
        if initiator_signals.is_empty() {
            return Err(ElaborateError::AmbiguousConnection {
                reason: "connect has no initiator and no constant".to_string(),
            });
        }

        let n_init = initiator_signals.len();
        for (i, (target_port, target_idx)) in target_signals.iter().enumerate() {
            let (init_port, init_idx) = initiator_signals[i % n_init];
            let source = if init_idx == -1 {
                let value = connect
                    .constant
                    .as_ref()
                    .map(|c| c.value.parse().unwrap_or(0))
                    .unwrap_or(0);
                DriveSource::Constant(value)
            } else {
                DriveSource::Port { id: init_port, signal_index: init_idx }
            };
            let conn_id = self.project.alloc_id();
            self.project.insert_connection(Connection {
                id: conn_id,
                source,
                target_port: *target_port,
                target_signal_index: *target_idx,
                attributes: Default::default(),
            });
            if let Some(p) = self.project.ports.get_mut(target_port) {
                if let Some(slot) = p.connected_signals.get_mut(*target_idx as usize) {
                    *slot = true;
                }
            }
            touched.insert((*target_port, *target_idx));
            if init_idx != -1 {
                touched.insert((init_port, init_idx));
            }
        }

        Ok(())
    }

    fn distribute_clk_rst(&mut self, mod_def: &Mod, own_block: NodeId, child_ids: &[NodeId]) -> Result<(), ElaborateError> {
        for is_clk in [true, false] {
            let own_source = self
                .project
                .blocks
                .get(&own_block)
                .and_then(|b| b.ports.iter().find(|pid| {
                    let p = &self.project.ports[pid];
                    if is_clk { p.is_principal_clk } else { p.is_principal_rst }
                }))
                .copied();
            let root_point = if is_clk { &mod_def.clk_root } else { &mod_def.rst_root };
            let source = match root_point {
                Some(point) => self.flatten_point(own_block, child_ids, point).map(|(pid, _, idx)| (pid, idx[0])),
                None => own_source.map(|pid| (pid, 0)),
            };
            let Some((source_port, source_idx)) = source else { continue };

            for &child_id in child_ids {
                let target_port = self.project.blocks.get(&child_id).and_then(|b| {
                    b.ports.iter().find(|pid| {
                        let p = &self.project.ports[pid];
                        (if is_clk { p.is_principal_clk } else { p.is_principal_rst }) && p.role == PortRole::Slave
                    })
                }).copied();
                let Some(target_port) = target_port else { continue };
                let already_connected = self.project.ports[&target_port].connected_signals.first().copied().unwrap_or(true);
                if already_connected {
                    continue;
                }
                let conn_id = self.project.alloc_id();
                self.project.insert_connection(Connection {
                    id: conn_id,
                    source: DriveSource::Port { id: source_port, signal_index: source_idx },
                    target_port,
                    target_signal_index: 0,
                    attributes: Default::default(),
                });
                if let Some(p) = self.project.ports.get_mut(&target_port) {
                    p.connected_signals[0] = true;
                }
            }
        }
        Ok(())
    }

    fn infer_implicit(
        &mut self,
        own_block: NodeId,
        child_ids: &[NodeId],
        touched: &HashSet<(NodeId, i64)>,
        strict: bool,
    ) -> Result<(), ElaborateError> {
        let mut initiators: Vec<(NodeId, String, NodeId, i64)> = Vec::new();
        let mut targets: Vec<(NodeId, String, NodeId, i64)> = Vec::new();

        let mut candidates: Vec<(NodeId, bool)> = vec![(own_block, true)];
        for &c in child_ids {
            candidates.push((c, false));
        }

        for (owner, is_own) in candidates {
            let Some(block) = self.project.blocks.get(&owner) else { continue };
            for &port_id in &block.ports {
                let port = &self.project.ports[&port_id];
                if port.is_principal_clk || port.is_principal_rst {
                    continue;
                }
                let fully_unconnected = port.connected_signals.iter().all(|c| !*c)
                    && !port.connected_signals.iter().enumerate().any(|(i, _)| touched.contains(&(port_id, i as i64)));
                if !fully_unconnected {
                    continue;
                }
                let entry = (owner, port.name.clone(), port.interconnect, port.count);
                match Self::direction_of(is_own, port.role) {
                    Direction::Initiator => initiators.push(entry),
                    Direction::Target => targets.push(entry),
                }
            }
        }

        for (t_owner, t_name, t_ic, t_count) in targets {
            let candidate = initiators.iter().find(|(i_owner, i_name, i_ic, _)| {
                *i_owner != t_owner && *i_ic == t_ic && (!strict || *i_name == t_name)
            });
            let Some(&(i_owner, _, _, i_count)) = candidate else { continue };
            let t_port = self.project.blocks[&t_owner]
                .ports
                .iter()
                .find(|pid| self.project.ports[pid].name == t_name)
                .copied();
            let i_port = self.project.blocks[&i_owner]
                .ports
                .iter()
                .find(|pid| self.project.ports[pid].interconnect == t_ic)
                .copied();
            let (Some(t_port), Some(i_port)) = (t_port, i_port) else { continue };
            for idx in 0..t_count.max(1) {
                let src_idx = idx % i_count.max(1);
                let conn_id = self.project.alloc_id();
                self.project.insert_connection(Connection {
                    id: conn_id,
                    source: DriveSource::Port { id: i_port, signal_index: src_idx },
                    target_port: t_port,
                    target_signal_index: idx,
                    attributes: Default::default(),
                });
                if let Some(p) = self.project.ports.get_mut(&t_port) {
                    if let Some(slot) = p.connected_signals.get_mut(idx as usize) {
                        *slot = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn warn_unconnected(&mut self, own_block: NodeId, child_ids: &[NodeId], defaults: &HashSet<String>) {
        let mut candidates = vec![own_block];
        candidates.extend(child_ids);
        for owner in candidates {
            let Some(block) = self.project.blocks.get(&owner) else { continue };
            for &port_id in &block.ports {
                let port = &self.project.ports[&port_id];
                if defaults.contains(&port.name) {
                    continue;
                }
                if port.connected_signals.iter().any(|c| !*c) {
                    self.report.warn(
                        &["elaborate", "module"],
                        format!("port '{}' on block '{}' is under-populated", port.name, block.name),
                    );
                }
            }
        }
    }
}

pub fn build_mod_registry<'a>(mods: &[&'a Mod]) -> HashMap<String, &'a Mod> {
    mods.iter().map(|m| (m.common.name.clone(), *m)).collect()
}

pub fn find_top<'a>(mods: &[&'a Mod], top_name: &str) -> Option<&'a Mod> {
    mods.iter().find(|m| m.common.name == top_name).copied()
}
