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

//! Register elaborator: places `Config`/`Group`/`Reg`/`Field` forests into
//! a concrete byte-addressed layout, applying `EVENT`/`SETCLEAR` register
//! expansions before placement and detecting address/bit overlaps.

use crate::errors::ElaborateError;
use crate::graph::{AccessKind, Register, RegisterField, RegisterGroup};
use crate::report::Report;
use crate::schema::{Access, Config, ConfigEntry, Define, Field, Group, GroupType, Reg};

fn access_kind(a: Access) -> AccessKind {
    match a {
        Access::WO => AccessKind::WO,
        Access::RO => AccessKind::RO,
        Access::RW => AccessKind::RW,
        Access::AW => AccessKind::AW,
        Access::AR => AccessKind::AR,
        Access::ARW => AccessKind::ARW,
        Access::WS => AccessKind::WS,
        Access::WC => AccessKind::WC,
    }
}

/// A reg produced by `EVENT`/`SETCLEAR` expansion or passed through
/// unchanged, ready for placement.
struct ExpandedReg {
    name: String,
    addr: Option<i64>,
    align: Option<i64>,
    width_bits: i64,
    array: i64,
    blockaccess: Access,
    busaccess: Access,
    instaccess: Access,
    fields: Vec<Field>,
}

fn parse_int(expr: &str) -> i64 {
    expr.trim().parse().unwrap_or(0)
}

fn expand_reg(reg: &Reg) -> Vec<ExpandedReg> {
    let base_width = reg
        .width
        .as_ref()
        .map(|w| parse_int(w))
        .unwrap_or_else(|| default_width_from_fields(&reg.fields));

    if reg.common.options.contains("EVENT") {
        let has_level = reg.common.options.contains("HAS_LEVEL");
        let has_mode = reg.common.options.contains("HAS_MODE");
        let mut out = Vec::new();
        let subs: &[(&str, Access)] = &[
            ("rsta", Access::RO),
            ("msta", Access::RO),
            ("clear", Access::WC),
            ("enable", Access::RW),
            ("set", Access::WS),
        ];
        for (suffix, access) in subs {
            out.push(sub_reg(reg, suffix, *access, base_width));
        }
        if has_level {
            out.push(sub_reg(reg, "level", Access::RW, base_width));
        }
        if has_mode {
            out.push(sub_reg(reg, "mode", Access::RW, base_width));
        }
        out
    } else if reg.common.options.contains("SETCLEAR") {
        vec![
            sub_reg_named(reg, reg.common.name.clone(), Access::RW, base_width),
            sub_reg(reg, "set", Access::WS, base_width),
            sub_reg(reg, "clear", Access::WC, base_width),
        ]
    } else {
        vec![ExpandedReg {
            name: reg.common.name.clone(),
            addr: reg.addr.as_ref().map(|a| parse_int(a)),
            align: reg.align.as_ref().map(|a| parse_int(a)),
            width_bits: base_width,
            array: reg.array.parse().unwrap_or(1),
            blockaccess: reg.blockaccess,
            busaccess: reg.busaccess,
            instaccess: reg.instaccess,
            fields: reg.fields.clone(),
        }]
    }
}

fn default_width_from_fields(fields: &[Field]) -> i64 {
    let max_bit = fields
        .iter()
        .filter_map(|f| f.msb.as_ref().map(|m| parse_int(m)))
        .max();
    match max_bit {
        Some(m) => m + 1,
        None => 32,
    }
}

fn sub_reg(reg: &Reg, suffix: &str, access: Access, width_bits: i64) -> ExpandedReg {
    sub_reg_named(reg, format!("{}_{suffix}", reg.common.name), access, width_bits)
}

fn sub_reg_named(reg: &Reg, name: String, access: Access, width_bits: i64) -> ExpandedReg {
    ExpandedReg {
        name,
        addr: None,
        align: None,
        width_bits,
        array: 1,
        blockaccess: access,
        busaccess: access,
        instaccess: access,
        fields: Vec::new(),
    }
}

fn unit_bytes(group: &Group) -> i64 {
    if group.common.options.contains("BYTE") { 1 } else { 4 }
}

fn align_up(value: i64, align: i64) -> i64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Places one Group's registers. `cursor_units` is the cursor at group
/// entry (in the group's own addressing unit) and the return value is the
/// cursor just past the group so sibling group/macro placement can
/// continue from there.
fn place_group(
    group: &Group,
    base_units: i64,
    defines: &[&Define],
    report: &mut Report,
) -> Result<(RegisterGroup, i64), ElaborateError> {
    let unit = unit_bytes(group);
    let mut cursor = 0i64;
    let mut registers = Vec::new();

    for reg in &group.regs {
        for expanded in expand_reg(reg) {
            let (fields, width_bits) =
                place_fields(&expanded.name, &expanded.fields, expanded.width_bits, report)?;
            let size_units = width_bits.div_ceil(8 * unit).max(1);
            let placement = match expanded.addr {
                Some(a) => a,
                None => align_up(cursor, expanded.align.unwrap_or(1)),
            };
            for i in 0..expanded.array.max(1) {
                let name = if expanded.array > 1 {
                    format!("{}_{i}", expanded.name)
                } else {
                    expanded.name.clone()
                };
                let addr_units = placement + i * size_units;
                let addr_bytes = (base_units + addr_units) * unit;
                let width_bytes = size_units * unit;

                for existing in &registers {
                    let e: &Register = existing;
                    if ranges_overlap(addr_bytes, width_bytes, e.addr, e.width_bytes) {
                        return Err(ElaborateError::AddressOverlap {
                            a: e.name.clone(),
                            b: name.clone(),
                            a_range: (e.addr as u64, (e.addr + e.width_bytes) as u64),
                            b_range: (addr_bytes as u64, (addr_bytes + width_bytes) as u64),
                        });
                    }
                }

                registers.push(Register {
                    id: 0,
                    name,
                    addr: addr_bytes,
                    width_bytes,
                    blockaccess: access_kind(expanded.blockaccess),
                    busaccess: access_kind(expanded.busaccess),
                    instaccess: access_kind(expanded.instaccess),
                    fields: fields.clone(),
                    attributes: Default::default(),
                });
            }
            cursor = placement + expanded.array.max(1) * size_units;
        }
    }

    apply_overrides(&group.common.name, &mut registers, defines);

    let group_size_units = cursor;
    Ok((
        RegisterGroup {
            id: 0,
            name: group.common.name.clone(),
            byte_mode: group.common.options.contains("BYTE"),
            registers,
            attributes: Default::default(),
        },
        group_size_units,
    ))
}

fn ranges_overlap(a_addr: i64, a_size: i64, b_addr: i64, b_size: i64) -> bool {
    a_addr < b_addr + b_size && b_addr < a_addr + a_size
}

/// Places fields in declaration order, then widens `width_bits` (and warns)
/// if the highest placed `msb` exceeds the register's nominal width.
/// Returns the placed fields and the effective (possibly widened) width.
fn place_fields(
    reg_name: &str,
    fields: &[Field],
    width_bits: i64,
    report: &mut Report,
) -> Result<(Vec<RegisterField>, i64), ElaborateError> {
    let mut placed: Vec<RegisterField> = Vec::new();
    let mut cursor = 0i64;
    let mut max_msb = -1i64;
    for field in fields {
        let width = parse_int(&field.width);
        let lsb = field.lsb.as_ref().map(|l| parse_int(l)).unwrap_or(cursor);
        let msb = field.msb.as_ref().map(|m| parse_int(m)).unwrap_or(lsb + width - 1);
        for existing in &placed {
            if lsb <= existing.msb && existing.lsb <= msb {
                return Err(ElaborateError::FieldOverlap {
                    reg: reg_name.to_string(),
                    a: existing.name.clone(),
                    b: field.common.name.clone(),
                });
            }
        }
        placed.push(RegisterField {
            id: 0,
            name: field.common.name.clone(),
            lsb,
            msb,
            signed: field.signed,
            reset: field.reset.parse().unwrap_or(0),
            enums: field.enums.iter().map(|e| (e.common.name.clone(), e.value, e.description.clone())).collect(),
            attributes: Default::default(),
        });
        max_msb = max_msb.max(msb);
        cursor = msb + 1;
    }

    let effective_width = if max_msb >= width_bits {
        let widened = max_msb + 1;
        report.warn(
            &["elaborate", "registers"],
            format!(
                "register '{reg_name}' auto-widened from {width_bits} to {widened} bits to fit field layout"
            ),
        );
        widened
    } else {
        width_bits
    };

    Ok((placed, effective_width))
}

fn apply_overrides(group_name: &str, registers: &mut [Register], defines: &[&Define]) {
    for define in defines {
        let base = define.group.split('_').next().unwrap_or(&define.group);
        if define.group != group_name && base != group_name {
            continue;
        }
        for reg in registers.iter_mut() {
            if reg.name != define.reg && !reg.name.starts_with(&format!("{}_", define.reg)) {
                continue;
            }
            for (key, value) in &define.overrides {
                match key.as_str() {
                    "busaccess" => {
                        if let Some(a) = Access::parse(value) {
                            reg.busaccess = access_kind(a);
                        }
                    }
                    "blockaccess" => {
                        if let Some(a) = Access::parse(value) {
                            reg.blockaccess = access_kind(a);
                        }
                    }
                    "instaccess" => {
                        if let Some(a) = Access::parse(value) {
                            reg.instaccess = access_kind(a);
                        }
                    }
                    _ => {
                        reg.attributes.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }
}

/// Elaborates the full register map for one block: picks or synthesizes a
/// `Config`, places every group/macro entry in order, and returns the
/// resulting register groups.
pub fn elaborate_registers(
    groups: &[&Group],
    config: Option<&Config>,
    defines: &[&Define],
    report: &mut Report,
) -> Result<Vec<RegisterGroup>, ElaborateError> {
    let by_name: std::collections::HashMap<&str, &Group> =
        groups.iter().map(|g| (g.common.name.as_str(), *g)).collect();

    let synthesized;
    let entries: &[ConfigEntry] = match config {
        Some(c) => &c.entries,
        None => {
            synthesized = groups
                .iter()
                .filter(|g| g.group_type == GroupType::Register)
                .map(|g| ConfigEntry::Register { group: g.common.name.clone() })
                .collect::<Vec<_>>();
            &synthesized
        }
    };

    let mut cursor_units = 0i64;
    let mut result = Vec::new();

    for entry in entries {
        match entry {
            ConfigEntry::Register { group } => {
                let g = by_name.get(group.as_str()).ok_or_else(|| ElaborateError::UndefinedReference {
                    kind: "group".to_string(),
                    name: group.clone(),
                })?;
                let (rg, size) = place_group(g, cursor_units, defines, report)?;
                cursor_units += size;
                result.push(rg);
            }
            ConfigEntry::Macro { group, prefix, array, align } => {
                let g = by_name.get(group.as_str()).ok_or_else(|| ElaborateError::UndefinedReference {
                    kind: "group".to_string(),
                    name: group.clone(),
                })?;
                if g.group_type != GroupType::Macro {
                    return Err(ElaborateError::UndefinedReference {
                        kind: "macro group".to_string(),
                        name: group.clone(),
                    });
                }
                let count: i64 = array.parse().unwrap_or(1);
                let align_units: i64 = align.parse().unwrap_or(1);
                for i in 0..count {
                    cursor_units = align_up(cursor_units, align_units);
                    let (mut rg, size) = place_group(g, cursor_units, defines, report)?;
                    rg.name = format!("{prefix}_{i}");
                    cursor_units += size;
                    result.push(rg);
                }
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Common, Reg};

    fn common(name: &str, opts: &[&str]) -> Common {
        Common {
            name: name.to_string(),
            options: opts.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn reg(name: &str, addr: Option<&str>, width: &str) -> Reg {
        Reg {
            common: common(name, &[]),
            addr: addr.map(|s| s.to_string()),
            align: None,
            width: Some(width.to_string()),
            array: "1".to_string(),
            blockaccess: Access::RW,
            busaccess: Access::RW,
            instaccess: Access::RW,
            location: crate::schema::Location::Internal,
            fields: vec![],
        }
    }

    #[test]
    fn byte_mode_overlap_is_detected() {
        let group = Group {
            common: common("G", &["BYTE"]),
            group_type: GroupType::Register,
            regs: vec![reg("a", Some("0"), "32"), reg("b", Some("2"), "32")],
        };
        let mut report = Report::new();
        let result = elaborate_registers(&[&group], None, &[], &mut report);
        assert!(matches!(result, Err(ElaborateError::AddressOverlap { .. })));
    }

    #[test]
    fn word_mode_addr_is_four_times_byte() {
        let group = Group {
            common: common("G", &[]),
            group_type: GroupType::Register,
            regs: vec![reg("a", Some("4"), "32")],
        };
        let mut report = Report::new();
        let result = elaborate_registers(&[&group], None, &[], &mut report).unwrap();
        assert_eq!(result[0].registers[0].addr, 16);
    }

    #[test]
    fn array_one_is_identical_to_bare() {
        let mut r = reg("a", Some("0"), "32");
        r.array = "1".to_string();
        let group = Group {
            common: common("G", &["BYTE"]),
            group_type: GroupType::Register,
            regs: vec![r],
        };
        let mut report = Report::new();
        let result = elaborate_registers(&[&group], None, &[], &mut report).unwrap();
        assert_eq!(result[0].registers.len(), 1);
        assert_eq!(result[0].registers[0].name, "a");
    }

    #[test]
    fn event_expansion_produces_five_subregisters() {
        let mut r = reg("irq", None, "1");
        r.common.options.insert("EVENT".to_string());
        let group = Group {
            common: common("G", &[]),
            group_type: GroupType::Register,
            regs: vec![r],
        };
        let mut report = Report::new();
        let result = elaborate_registers(&[&group], None, &[], &mut report).unwrap();
        assert_eq!(result[0].registers.len(), 5);
        assert_eq!(result[0].registers[0].name, "irq_rsta");
        assert_eq!(result[0].registers[0].busaccess, AccessKind::RO);
        assert_eq!(result[0].registers[2].name, "irq_clear");
        assert_eq!(result[0].registers[2].busaccess, AccessKind::WC);
    }

    #[test]
    fn field_past_nominal_width_widens_register_and_warns() {
        let mut r = reg("ctrl", Some("0"), "8");
        r.fields = vec![Field {
            common: common("overflow", &[]),
            width: "1".to_string(),
            lsb: Some("9".to_string()),
            msb: Some("9".to_string()),
            signed: false,
            reset: "0".to_string(),
            enums: vec![],
        }];
        let group = Group {
            common: common("G", &["BYTE"]),
            group_type: GroupType::Register,
            regs: vec![r],
        };
        let mut report = Report::new();
        let result = elaborate_registers(&[&group], None, &[], &mut report).unwrap();
        assert_eq!(result[0].registers[0].width_bytes, 2);
        assert_eq!(
            report.entries().iter().filter(|d| d.severity == crate::report::Severity::Warning).count(),
            1
        );
        assert!(report.entries()[0].message.contains("auto-widened"));
    }
}
