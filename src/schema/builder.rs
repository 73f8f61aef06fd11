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

//! Mapping/sequence dual construction: every tag kind accepts either
//! named attributes or positional values in the kind's declared
//! constructor order; both forms are resolved into the same [`AttrMap`]
//! before a single builder function assembles the typed record, which is
//! what guarantees mapping-form and sequence-form inputs produce identical
//! schema objects.

use std::collections::HashSet;

use crate::errors::SchemaError;
use crate::schema::parser::{RawForm, RawRecord, RawValue};
use crate::schema::*;

const LEGACY_TAGS: &[&str] = &["file", "req", "spec", "unroll", "map"];

struct AttrMap<'a> {
    file: String,
    line: usize,
    tag: String,
    map: std::collections::HashMap<String, &'a RawValue>,
    children: &'a [RawRecord],
}

impl<'a> AttrMap<'a> {
    fn from_raw(raw: &'a RawRecord, seq_order: &[&str]) -> Result<Self, SchemaError> {
        let mut map = std::collections::HashMap::new();
        let children: &[RawRecord] = match &raw.form {
            RawForm::Mapping { attrs, children } => {
                for (name, value, line) in attrs {
                    if !seq_order.contains(&name.as_str()) {
                        return Err(SchemaError::UnknownAttribute {
                            file: raw.file.clone(),
                            line: *line,
                            tag: raw.tag.clone(),
                            attribute: name.clone(),
                        });
                    }
                    map.insert(name.clone(), value);
                }
                children.as_slice()
            }
            RawForm::Sequence { values } => {
                if values.len() > seq_order.len() {
                    return Err(SchemaError::Syntax {
                        file: raw.file.clone(),
                        line: raw.line,
                        reason: format!(
                            "too many positional values for '{}' (expected at most {})",
                            raw.tag,
                            seq_order.len()
                        ),
                    });
                }
                for (i, v) in values.iter().enumerate() {
                    map.insert(seq_order[i].to_string(), v);
                }
                &[]
            }
        };
        Ok(Self {
            file: raw.file.clone(),
            line: raw.line,
            tag: raw.tag.clone(),
            map,
            children,
        })
    }

    fn get(&self, name: &str) -> Option<&RawValue> {
        self.map.get(name).copied()
    }

    fn expr(&self, name: &str) -> Option<Expr> {
        match self.get(name) {
            Some(RawValue::Int(i)) => Some(i.to_string()),
            Some(RawValue::Ident(s)) => Some(s.clone()),
            Some(RawValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn expr_required(&self, name: &str) -> Result<Expr, SchemaError> {
        self.expr(name).ok_or_else(|| SchemaError::WrongValueType {
            file: self.file.clone(),
            line: self.line,
            tag: self.tag.clone(),
            attribute: name.to_string(),
            expected: "expression".to_string(),
        })
    }

    fn string(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(RawValue::Str(s)) => Some(s.clone()),
            Some(RawValue::Ident(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn int_required(&self, name: &str) -> Result<i64, SchemaError> {
        match self.get(name) {
            Some(RawValue::Int(i)) => Ok(*i),
            _ => Err(SchemaError::WrongValueType {
                file: self.file.clone(),
                line: self.line,
                tag: self.tag.clone(),
                attribute: name.to_string(),
                expected: "integer".to_string(),
            }),
        }
    }

    fn options(&self) -> HashSet<String> {
        match self.get("options") {
            Some(RawValue::Options(opts)) => opts.iter().cloned().collect(),
            _ => HashSet::new(),
        }
    }

    fn children_of<'b>(&'b self, tag: &str) -> impl Iterator<Item = &'b RawRecord> {
        self.children.iter().filter(move |c| c.tag.eq_ignore_ascii_case(tag))
    }

    fn role(&self, name: &str) -> Result<Role, SchemaError> {
        match self.string(name).as_deref() {
            Some("master") => Ok(Role::Master),
            Some("slave") => Ok(Role::Slave),
            _ => Err(SchemaError::WrongValueType {
                file: self.file.clone(),
                line: self.line,
                tag: self.tag.clone(),
                attribute: name.to_string(),
                expected: "'master' or 'slave'".to_string(),
            }),
        }
    }
}

fn common(raw: &RawRecord, attrs: &AttrMap) -> Common {
    Common {
        name: raw.name.clone().or_else(|| attrs.string("name")).unwrap_or_default(),
        short_description: attrs.string("short_description").unwrap_or_default(),
        long_description: attrs.string("long_description").unwrap_or_default(),
        options: attrs.options(),
        source_file: raw.file.clone(),
        line: raw.line,
    }
}

/// Parses the raw top-level forest of one preprocessed file into typed
/// schema records. Unknown top-level tags are rejected; legacy tags
/// are recorded but otherwise ignored downstream.
pub fn build_records(raws: &[RawRecord]) -> Result<Vec<SchemaRecord>, SchemaError> {
    let mut out = Vec::new();
    for raw in raws {
        let lower = raw.tag.to_ascii_lowercase();
        if LEGACY_TAGS.contains(&lower.as_str()) {
            out.push(SchemaRecord::Legacy(LegacyTag {
                tag: raw.tag.clone(),
                source_file: raw.file.clone(),
                line: raw.line,
            }));
            continue;
        }
        match lower.as_str() {
            "def" => out.push(SchemaRecord::Def(build_def(raw)?)),
            "his" => out.push(SchemaRecord::His(build_his(raw)?)),
            "mod" => out.push(SchemaRecord::Mod(build_mod(raw)?)),
            "inst" => out.push(SchemaRecord::Inst(build_inst(raw)?)),
            "group" => out.push(SchemaRecord::Group(build_group(raw)?)),
            "config" => out.push(SchemaRecord::Config(build_config(raw)?)),
            "define" => out.push(SchemaRecord::Define(build_define(raw)?)),
            _ => {
                return Err(SchemaError::UnknownTag {
                    file: raw.file.clone(),
                    line: raw.line,
                    tag: raw.tag.clone(),
                });
            }
        }
    }
    Ok(out)
}

fn build_def(raw: &RawRecord) -> Result<Def, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options", "value"])?;
    Ok(Def {
        value_expr: attrs.expr_required("value")?,
        common: common(raw, &attrs),
    })
}

fn build_enum(raw: &RawRecord) -> Result<Enum, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "value", "description"],
    )?;
    Ok(Enum {
        value: attrs.int_required("value")?,
        description: attrs.string("description").unwrap_or_default(),
        common: common(raw, &attrs),
    })
}

fn build_port(raw: &RawRecord) -> Result<Port, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &[
            "name",
            "short_description",
            "long_description",
            "options",
            "width",
            "count",
            "default",
            "role",
        ],
    )?;
    let enums = attrs
        .children_of("enum")
        .map(build_enum)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Port {
        width: attrs.expr_required("width")?,
        count: attrs.expr("count").unwrap_or_else(|| "1".to_string()),
        default: attrs.expr("default"),
        role: attrs.role("role")?,
        enums,
        common: common(raw, &attrs),
    })
}

fn build_hisref(raw: &RawRecord) -> Result<HisRef, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "type", "count", "role"],
    )?;
    Ok(HisRef {
        type_name: attrs.string("type").ok_or_else(|| SchemaError::WrongValueType {
            file: raw.file.clone(),
            line: raw.line,
            tag: raw.tag.clone(),
            attribute: "type".to_string(),
            expected: "identifier".to_string(),
        })?,
        count: attrs.expr("count").unwrap_or_else(|| "1".to_string()),
        role: attrs.role("role")?,
        common: common(raw, &attrs),
    })
}

fn build_his(raw: &RawRecord) -> Result<His, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options"])?;
    let mut components = Vec::new();
    for child in attrs.children {
        match child.tag.to_ascii_lowercase().as_str() {
            "port" => components.push(HisComponent::Port(build_port(child)?)),
            "hisref" => components.push(HisComponent::HisRef(build_hisref(child)?)),
            other => {
                return Err(SchemaError::UnknownTag {
                    file: child.file.clone(),
                    line: child.line,
                    tag: other.to_string(),
                });
            }
        }
    }
    Ok(His {
        components,
        common: common(raw, &attrs),
    })
}

fn build_field(raw: &RawRecord) -> Result<Field, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &[
            "name",
            "short_description",
            "long_description",
            "options",
            "width",
            "lsb",
            "msb",
            "signed",
            "reset",
        ],
    )?;
    let enums = attrs
        .children_of("enum")
        .map(build_enum)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Field {
        width: attrs.expr_required("width")?,
        lsb: attrs.expr("lsb"),
        msb: attrs.expr("msb"),
        signed: matches!(attrs.string("signed").as_deref(), Some("true") | Some("signed")),
        reset: attrs.expr("reset").unwrap_or_else(|| "0".to_string()),
        enums,
        common: common(raw, &attrs),
    })
}

fn build_reg(raw: &RawRecord) -> Result<Reg, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &[
            "name",
            "short_description",
            "long_description",
            "options",
            "addr",
            "align",
            "width",
            "array",
            "blockaccess",
            "busaccess",
            "instaccess",
            "location",
        ],
    )?;
    let fields = attrs
        .children_of("field")
        .map(build_field)
        .collect::<Result<Vec<_>, _>>()?;
    let access = |name: &str, default: Access| -> Result<Access, SchemaError> {
        match attrs.string(name) {
            Some(s) => Access::parse(&s).ok_or_else(|| SchemaError::WrongValueType {
                file: raw.file.clone(),
                line: raw.line,
                tag: raw.tag.clone(),
                attribute: name.to_string(),
                expected: "access kind".to_string(),
            }),
            None => Ok(default),
        }
    };
    let location = match attrs.string("location").as_deref() {
        Some("wrapper") => Location::Wrapper,
        Some("core") => Location::Core,
        _ => Location::Internal,
    };
    Ok(Reg {
        addr: attrs.expr("addr"),
        align: attrs.expr("align"),
        width: attrs.expr("width"),
        array: attrs.expr("array").unwrap_or_else(|| "1".to_string()),
        blockaccess: access("blockaccess", Access::RW)?,
        busaccess: access("busaccess", Access::RW)?,
        instaccess: access("instaccess", Access::RW)?,
        location,
        fields,
        common: common(raw, &attrs),
    })
}

fn build_group(raw: &RawRecord) -> Result<Group, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options", "type"])?;
    let regs = attrs.children_of("reg").map(build_reg).collect::<Result<Vec<_>, _>>()?;
    let group_type = match attrs.string("type").as_deref() {
        Some("macro") => GroupType::Macro,
        _ => GroupType::Register,
    };
    Ok(Group {
        group_type,
        regs,
        common: common(raw, &attrs),
    })
}

fn build_config(raw: &RawRecord) -> Result<Config, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options"])?;
    let mut entries = Vec::new();
    for child in attrs.children {
        match child.tag.to_ascii_lowercase().as_str() {
            "register" => {
                let cattrs = AttrMap::from_raw(child, &["group"])?;
                entries.push(ConfigEntry::Register {
                    group: cattrs.string("group").or_else(|| child.name.clone()).ok_or_else(|| {
                        SchemaError::WrongValueType {
                            file: child.file.clone(),
                            line: child.line,
                            tag: child.tag.clone(),
                            attribute: "group".to_string(),
                            expected: "identifier".to_string(),
                        }
                    })?,
                });
            }
            "macro" => {
                let cattrs = AttrMap::from_raw(child, &["group", "prefix", "array", "align"])?;
                entries.push(ConfigEntry::Macro {
                    group: cattrs.string("group").or_else(|| child.name.clone()).ok_or_else(|| {
                        SchemaError::WrongValueType {
                            file: child.file.clone(),
                            line: child.line,
                            tag: child.tag.clone(),
                            attribute: "group".to_string(),
                            expected: "identifier".to_string(),
                        }
                    })?,
                    prefix: cattrs.string("prefix").unwrap_or_default(),
                    array: cattrs.expr("array").unwrap_or_else(|| "1".to_string()),
                    align: cattrs.expr("align").unwrap_or_else(|| "1".to_string()),
                });
            }
            other => {
                return Err(SchemaError::UnknownTag {
                    file: child.file.clone(),
                    line: child.line,
                    tag: other.to_string(),
                });
            }
        }
    }
    Ok(Config {
        entries,
        common: common(raw, &attrs),
    })
}

fn build_define(raw: &RawRecord) -> Result<Define, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "group", "reg", "field"],
    )?;
    let mut overrides = Vec::new();
    if let RawForm::Mapping { attrs: raw_attrs, .. } = &raw.form {
        // Any attribute beyond the fixed set is an override of the target entity.
        let fixed = ["group", "reg", "field", "name", "short_description", "long_description", "options"];
        for (name, value, _) in raw_attrs {
            if !fixed.contains(&name.as_str()) {
                let text = match value {
                    RawValue::Int(i) => i.to_string(),
                    RawValue::Ident(s) | RawValue::Str(s) => s.clone(),
                    RawValue::Options(_) => continue,
                };
                overrides.push((name.clone(), text));
            }
        }
    }
    Ok(Define {
        group: attrs.string("group").unwrap_or_default(),
        reg: attrs.string("reg").unwrap_or_default(),
        field: attrs.string("field"),
        overrides,
        common: common(raw, &attrs),
    })
}

fn build_point(raw: &RawRecord) -> Result<Point, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["port", "module", "index"])?;
    Ok(Point {
        port: attrs.string("port").or_else(|| raw.name.clone()).unwrap_or_default(),
        module: attrs.string("module"),
        signal_index: attrs.expr("index"),
        common: common(raw, &attrs),
    })
}

fn build_const(raw: &RawRecord) -> Result<Const, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["value"])?;
    Ok(Const {
        value: attrs.expr_required("value")?,
        common: common(raw, &attrs),
    })
}

fn build_connect(raw: &RawRecord) -> Result<Connect, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options"])?;
    let points = attrs.children_of("point").map(build_point).collect::<Result<Vec<_>, _>>()?;
    let constant = attrs.children_of("const").next().map(build_const).transpose()?;
    Ok(Connect {
        points,
        constant,
        common: common(raw, &attrs),
    })
}

fn build_modinst(raw: &RawRecord) -> Result<ModInst, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "type", "description", "count"],
    )?;
    Ok(ModInst {
        instance_name: raw.name.clone().or_else(|| attrs.string("name")).unwrap_or_default(),
        mod_type: attrs.string("type").unwrap_or_default(),
        description: attrs.string("description").unwrap_or_default(),
        count: attrs.expr("count").unwrap_or_else(|| "1".to_string()),
        common: common(raw, &attrs),
    })
}

fn build_initiator(raw: &RawRecord) -> Result<Initiator, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options", "mask", "offset"])?;
    let point = attrs
        .children_of("point")
        .next()
        .map(build_point)
        .transpose()?
        .ok_or_else(|| SchemaError::WrongValueType {
            file: raw.file.clone(),
            line: raw.line,
            tag: raw.tag.clone(),
            attribute: "point".to_string(),
            expected: "nested point tag".to_string(),
        })?;
    let constraints = attrs.children_of("point").skip(1).map(build_point).collect::<Result<Vec<_>, _>>()?;
    Ok(Initiator {
        point,
        mask: attrs.expr("mask"),
        offset: attrs.expr("offset").unwrap_or_else(|| "0".to_string()),
        constraints,
        common: common(raw, &attrs),
    })
}

fn build_target(raw: &RawRecord) -> Result<Target, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "offset", "aperture"],
    )?;
    let point = attrs
        .children_of("point")
        .next()
        .map(build_point)
        .transpose()?
        .ok_or_else(|| SchemaError::WrongValueType {
            file: raw.file.clone(),
            line: raw.line,
            tag: raw.tag.clone(),
            attribute: "point".to_string(),
            expected: "nested point tag".to_string(),
        })?;
    let constraints = attrs.children_of("point").skip(1).map(build_point).collect::<Result<Vec<_>, _>>()?;
    Ok(Target {
        offset: attrs.expr_required("offset")?,
        aperture: attrs.expr_required("aperture")?,
        constraints,
        point,
        common: common(raw, &attrs),
    })
}

fn build_mod(raw: &RawRecord) -> Result<Mod, SchemaError> {
    let attrs = AttrMap::from_raw(raw, &["name", "short_description", "long_description", "options"])?;

    let ports_block = attrs.children_of("ports").next();
    let ports = match ports_block {
        Some(block) => {
            let pattrs = AttrMap::from_raw(block, &[])?;
            pattrs.children_of("hisref").map(build_hisref).collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let modules_block = attrs.children_of("modules").next();
    let modules = match modules_block {
        Some(block) => {
            let mattrs = AttrMap::from_raw(block, &[])?;
            mattrs.children_of("modinst").map(build_modinst).collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let connections_block = attrs.children_of("connections").next();
    let connections = match connections_block {
        Some(block) => {
            let cattrs = AttrMap::from_raw(block, &[])?;
            cattrs.children_of("connect").map(build_connect).collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let defaults_block = attrs.children_of("defaults").next();
    let defaults = match defaults_block {
        Some(block) => {
            let dattrs = AttrMap::from_raw(block, &[])?;
            dattrs.children_of("point").map(build_point).collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };

    let clk_root = attrs.children_of("clk_root").next().map(build_point).transpose()?;
    let rst_root = attrs.children_of("rst_root").next().map(build_point).transpose()?;

    let addressmap_block = attrs.children_of("addressmap").next();
    let (initiators, targets) = match addressmap_block {
        Some(block) => {
            let aattrs = AttrMap::from_raw(block, &[])?;
            (
                aattrs.children_of("initiator").map(build_initiator).collect::<Result<Vec<_>, _>>()?,
                aattrs.children_of("target").map(build_target).collect::<Result<Vec<_>, _>>()?,
            )
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(Mod {
        ports,
        modules,
        connections,
        defaults,
        clk_root,
        rst_root,
        initiators,
        targets,
        common: common(raw, &attrs),
    })
}

fn build_inst(raw: &RawRecord) -> Result<Inst, SchemaError> {
    let attrs = AttrMap::from_raw(
        raw,
        &["name", "short_description", "long_description", "options", "extends", "fixed_field", "fixed_value"],
    )?;
    let fields = attrs.children_of("field").map(build_field).collect::<Result<Vec<_>, _>>()?;
    let fixed_field = match (attrs.string("fixed_field"), attrs.string("fixed_value")) {
        (Some(f), Some(v)) => Some((f, v)),
        _ => None,
    };
    Ok(Inst {
        extends: attrs.string("extends"),
        fixed_field,
        fields,
        common: common(raw, &attrs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::parse_source;

    fn records(src: &str) -> Vec<SchemaRecord> {
        let raw = parse_source(src, "test.hw").expect("parse");
        build_records(&raw).expect("build")
    }

    #[test]
    fn def_mapping_and_sequence_agree() {
        let mapping = records("def FOO { value: 42 }");
        let sequence = records("def FOO(42)");
        let Some(SchemaRecord::Def(a)) = mapping.into_iter().next() else { panic!("expected def") };
        let Some(SchemaRecord::Def(b)) = sequence.into_iter().next() else { panic!("expected def") };
        assert_eq!(a.value_expr, b.value_expr);
        assert_eq!(a.common.name, b.common.name);
    }

    #[test]
    fn port_mapping_and_sequence_agree() {
        let mapping = records("his bus { port p { width: 8, count: 1, role: master } }");
        let sequence = records("his bus { port p(8, 1, master) }");
        let (Some(SchemaRecord::His(a)), Some(SchemaRecord::His(b))) =
            (mapping.into_iter().next(), sequence.into_iter().next())
        else {
            panic!("expected his records")
        };
        assert_eq!(a.components.len(), 1);
        assert_eq!(b.components.len(), 1);
        let (HisComponent::Port(pa), HisComponent::Port(pb)) = (&a.components[0], &b.components[0]) else {
            panic!("expected ports")
        };
        assert_eq!(pa.width, pb.width);
        assert_eq!(pa.role, pb.role);
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let raw = parse_source("def FOO { bogus: 1 }", "test.hw").unwrap();
        let err = build_records(&raw).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAttribute { .. }));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = parse_source("bogus FOO { value: 1 }", "test.hw").unwrap();
        let err = build_records(&raw).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTag { .. }));
    }

    #[test]
    fn legacy_tags_pass_through() {
        let recs = records("file BAZ { value: 1 }");
        assert!(matches!(recs[0], SchemaRecord::Legacy(_)));
    }

    #[test]
    fn reg_with_fields_and_access() {
        let recs = records(
            "group G { reg R { addr: 0x10, busaccess: RW, field F { width: 4, lsb: 0 } } }",
        );
        let Some(SchemaRecord::Group(g)) = recs.into_iter().next() else { panic!("expected group") };
        assert_eq!(g.regs.len(), 1);
        assert_eq!(g.regs[0].fields.len(), 1);
        assert_eq!(g.regs[0].busaccess, Access::RW);
    }

    #[test]
    fn mod_with_ports_and_connections() {
        let recs = records(
            "mod TOP { ports { hisref p { type: bus, count: 1, role: master } } \
             modules { modinst u0 { type: CHILD, count: 1 } } \
             connections { connect c { point a { port: x } point b { port: y } } } }",
        );
        let Some(SchemaRecord::Mod(m)) = recs.into_iter().next() else { panic!("expected mod") };
        assert_eq!(m.ports.len(), 1);
        assert_eq!(m.modules.len(), 1);
        assert_eq!(m.connections.len(), 1);
        assert_eq!(m.connections[0].points.len(), 2);
    }
}
