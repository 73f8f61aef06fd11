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

//! Schema object model: tagged records produced by parsing
//! preprocessed text. Schema records are immutable after parsing
//! and carry `(source_file, line)` plus the common attributes
//! every record kind shares.

pub mod builder;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Attributes every schema record carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Common {
    pub name: String,
    pub short_description: String,
    pub long_description: String,
    pub options: HashSet<String>,
    pub source_file: String,
    pub line: usize,
}

pub type Expr = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupType {
    Register,
    Macro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Internal,
    Wrapper,
    Core,
}

/// Values of `blockaccess`/`busaccess`/`instaccess` in the access lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    WO,
    RO,
    RW,
    AW,
    AR,
    ARW,
    WS,
    WC,
}

impl Access {
    pub fn parse(s: &str) -> Option<Access> {
        match s.to_ascii_uppercase().as_str() {
            "W" | "WO" => Some(Access::WO),
            "R" | "RO" => Some(Access::RO),
            "RW" => Some(Access::RW),
            "AW" => Some(Access::AW),
            "AR" => Some(Access::AR),
            "ARW" => Some(Access::ARW),
            "WS" => Some(Access::WS),
            "WC" => Some(Access::WC),
            _ => None,
        }
    }

    /// Access-constraint lattice: is `self` legal for `column`?
    pub fn legal_for(self, column: AccessColumn) -> bool {
        use Access::*;
        match column {
            AccessColumn::Block | AccessColumn::Inst => {
                matches!(self, WO | RO | RW)
            }
            AccessColumn::Bus => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessColumn {
    Block,
    Bus,
    Inst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub common: Common,
    pub value_expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enum {
    pub common: Common,
    pub value: i64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub common: Common,
    pub width: Expr,
    pub count: Expr,
    pub default: Option<Expr>,
    pub role: Role,
    pub enums: Vec<Enum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HisComponent {
    Port(Port),
    HisRef(HisRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct His {
    pub common: Common,
    pub components: Vec<HisComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HisRef {
    pub common: Common,
    pub type_name: String,
    pub count: Expr,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub common: Common,
    pub width: Expr,
    pub lsb: Option<Expr>,
    pub msb: Option<Expr>,
    pub signed: bool,
    pub reset: Expr,
    pub enums: Vec<Enum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reg {
    pub common: Common,
    pub addr: Option<Expr>,
    pub align: Option<Expr>,
    /// Bit width of the register; when absent, derived from the highest
    /// field's `msb + 1`, rounded up to the group's native unit.
    pub width: Option<Expr>,
    pub array: Expr,
    pub blockaccess: Access,
    pub busaccess: Access,
    pub instaccess: Access,
    pub location: Location,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub common: Common,
    pub group_type: GroupType,
    pub regs: Vec<Reg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigEntry {
    Register { group: String },
    Macro {
        group: String,
        prefix: String,
        array: Expr,
        align: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub common: Common,
    pub entries: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Define {
    pub common: Common,
    pub group: String,
    pub reg: String,
    pub field: Option<String>,
    pub overrides: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub common: Common,
    pub port: String,
    pub module: Option<String>,
    pub signal_index: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Const {
    pub common: Common,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connect {
    pub common: Common,
    pub points: Vec<Point>,
    pub constant: Option<Const>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModInst {
    pub common: Common,
    pub instance_name: String,
    pub mod_type: String,
    pub description: String,
    pub count: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initiator {
    pub common: Common,
    pub point: Point,
    pub mask: Option<Expr>,
    pub offset: Expr,
    pub constraints: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub common: Common,
    pub point: Point,
    pub offset: Expr,
    pub aperture: Expr,
    pub constraints: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mod {
    pub common: Common,
    pub ports: Vec<HisRef>,
    pub modules: Vec<ModInst>,
    pub connections: Vec<Connect>,
    pub defaults: Vec<Point>,
    pub clk_root: Option<Point>,
    pub rst_root: Option<Point>,
    pub initiators: Vec<Initiator>,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inst {
    pub common: Common,
    pub extends: Option<String>,
    pub fixed_field: Option<(String, String)>,
    pub fields: Vec<Field>,
}

/// Legacy tags: accepted by the parser, ignored by validation and
/// elaboration. Kept so a reimplementation can warn once per occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTag {
    pub tag: String,
    pub source_file: String,
    pub line: usize,
}

/// One top-level record parsed from a source file. `Group`/`Config`/
/// `Define` may appear at top level (typically via `#include` of a
/// register description into a `Mod`'s file) rather than
/// nested inside `Mod`; the module elaborator associates them with a
/// `Block` by file scope rather than by schema nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaRecord {
    Def(Def),
    His(His),
    Mod(Mod),
    Inst(Inst),
    Group(Group),
    Config(Config),
    Define(Define),
    Legacy(LegacyTag),
}
