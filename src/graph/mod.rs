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

//! The design graph: the elaborated, fully resolved output of the pipeline.
//! `Project` owns every principal node by a single global id space so
//! uniqueness is enforced at attachment time rather than after the fact.
//! Every node carries a free-form `attributes` map; it is explicitly
//! excluded from waiver hashing (`checker::hash_violation`) because it may
//! hold system-local absolute paths.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type NodeId = u64;
pub type Attributes = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetRole {
    Master,
    Slave,
}

impl NetRole {
    pub fn flip(self) -> NetRole {
        match self {
            NetRole::Master => NetRole::Slave,
            NetRole::Slave => NetRole::Master,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterconnectComponent {
    pub id: NodeId,
    pub name: String,
    pub width: i64,
    pub net_role: NetRole,
    /// `Some` for a complex component pointing at another Interconnect.
    pub complex_ref: Option<NodeId>,
    pub enums: Vec<(String, i64, String)>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interconnect {
    pub id: NodeId,
    pub name: String,
    pub components: Vec<InterconnectComponent>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortRole {
    Master,
    Slave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: NodeId,
    pub name: String,
    pub owner_block: NodeId,
    pub interconnect: NodeId,
    pub count: i64,
    pub role: PortRole,
    pub is_principal_clk: bool,
    pub is_principal_rst: bool,
    /// Per-signal-index whether something already drives/is driven (used by
    /// connection inference to detect under-population).
    pub connected_signals: Vec<bool>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterField {
    pub id: NodeId,
    pub name: String,
    pub lsb: i64,
    pub msb: i64,
    pub signed: bool,
    pub reset: i64,
    pub enums: Vec<(String, i64, String)>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    WO,
    RO,
    RW,
    AW,
    AR,
    ARW,
    WS,
    WC,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub id: NodeId,
    pub name: String,
    /// Address in the group's native unit (byte if `BYTE`, word otherwise).
    pub addr: i64,
    pub width_bytes: i64,
    pub blockaccess: AccessKind,
    pub busaccess: AccessKind,
    pub instaccess: AccessKind,
    pub fields: Vec<RegisterField>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterGroup {
    pub id: NodeId,
    pub name: String,
    pub byte_mode: bool,
    pub registers: Vec<Register>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Define {
    pub id: NodeId,
    pub name: String,
    pub value: i64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandField {
    pub id: NodeId,
    pub name: String,
    pub lsb: i64,
    pub msb: i64,
    pub fixed_value: Option<i64>,
    pub inherited: bool,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<CommandField>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressMapInitiator {
    pub id: NodeId,
    pub port: NodeId,
    pub signal_index: i64,
    pub mask: Option<i64>,
    pub offset: i64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressMapTarget {
    pub id: NodeId,
    pub port: NodeId,
    pub signal_index: i64,
    pub offset: i64,
    pub aperture: i64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressMap {
    pub id: NodeId,
    pub owner_block: NodeId,
    pub initiators: Vec<AddressMapInitiator>,
    pub targets: Vec<AddressMapTarget>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveSource {
    Port { id: NodeId, signal_index: i64 },
    Constant(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: NodeId,
    pub source: DriveSource,
    pub target_port: NodeId,
    pub target_signal_index: i64,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: NodeId,
    pub name: String,
    pub mod_type: String,
    pub source_file: String,
    pub ports: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub register_groups: Vec<RegisterGroup>,
    pub commands: Vec<Command>,
    pub address_map: Option<AddressMap>,
    pub attributes: Attributes,
}

/// Owns every principal node by a single id space (invariant: every
/// principal id is unique within its Project).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    next_id: NodeId,
    pub blocks: HashMap<NodeId, Block>,
    pub ports: HashMap<NodeId, Port>,
    pub interconnects: HashMap<NodeId, Interconnect>,
    pub defines: HashMap<NodeId, Define>,
    pub connections: HashMap<NodeId, Connection>,
    pub block_by_name: HashMap<String, NodeId>,
    pub interconnect_by_name: HashMap<String, NodeId>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_id(&mut self) -> NodeId {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert_block(&mut self, block: Block) -> NodeId {
        let id = block.id;
        self.block_by_name.insert(block.name.clone(), id);
        self.blocks.insert(id, block);
        id
    }

    pub fn insert_interconnect(&mut self, ic: Interconnect) -> NodeId {
        let id = ic.id;
        self.interconnect_by_name.insert(ic.name.clone(), id);
        self.interconnects.insert(id, ic);
        id
    }

    pub fn insert_port(&mut self, port: Port) -> NodeId {
        let id = port.id;
        self.ports.insert(id, port);
        id
    }

    pub fn insert_define(&mut self, define: Define) -> NodeId {
        let id = define.id;
        self.defines.insert(id, define);
        id
    }

    pub fn insert_connection(&mut self, conn: Connection) -> NodeId {
        let id = conn.id;
        self.connections.insert(id, conn);
        id
    }
}
