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

//! Schema validation: type-checks attribute values, restricts child tag
//! kinds, and enforces cross-attribute agreement. Unlike the parser and
//! builder, a validation pass does not stop at the first problem within a
//! record tree — every error is collected and returned together so a user
//! sees all of them in one run.

use crate::errors::ValidatorError;
use crate::schema::{AccessColumn, Field, Group, His, HisComponent, Mod, Port, Reg, SchemaRecord};

const REG_OPTIONS: &[&str] = &["EVENT", "SETCLEAR", "HAS_LEVEL", "HAS_MODE"];
const GROUP_OPTIONS: &[&str] = &["BYTE"];
const MOD_OPTIONS: &[&str] = &["NO_CLK_RST", "NO_AUTO_CLK_RST"];
const PORT_OPTIONS: &[&str] = &["AUTO_CLK", "AUTO_RST"];

/// Validates every top-level record, returning every problem found rather
/// than aborting at the first.
pub fn validate_all(records: &[SchemaRecord]) -> Result<(), Vec<ValidatorError>> {
    let mut errors = Vec::new();
    for record in records {
        match record {
            SchemaRecord::Group(g) => validate_group(g, &mut errors),
            SchemaRecord::Mod(m) => validate_mod(m, &mut errors),
            SchemaRecord::His(h) => validate_his(h, &mut errors),
            SchemaRecord::Def(_) | SchemaRecord::Inst(_) => {}
            SchemaRecord::Config(_) | SchemaRecord::Define(_) | SchemaRecord::Legacy(_) => {}
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_options(
    file: &str,
    line: usize,
    tag: &str,
    present: &std::collections::HashSet<String>,
    allowed: &[&str],
    errors: &mut Vec<ValidatorError>,
) {
    for opt in present {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(opt)) {
            errors.push(ValidatorError::IllegalOptionFlag {
                file: file.to_string(),
                line,
                tag: tag.to_string(),
                flag: opt.clone(),
            });
        }
    }
}

fn validate_group(group: &Group, errors: &mut Vec<ValidatorError>) {
    check_options(
        &group.common.source_file,
        group.common.line,
        "group",
        &group.common.options,
        GROUP_OPTIONS,
        errors,
    );
    for reg in &group.regs {
        validate_reg(reg, errors);
    }
}

fn validate_reg(reg: &Reg, errors: &mut Vec<ValidatorError>) {
    check_options(
        &reg.common.source_file,
        reg.common.line,
        "reg",
        &reg.common.options,
        REG_OPTIONS,
        errors,
    );

    if !reg.blockaccess.legal_for(AccessColumn::Block) {
        errors.push(ValidatorError::IllegalAccessCombination {
            file: reg.common.source_file.clone(),
            line: reg.common.line,
            tag: "reg".to_string(),
            reason: format!("blockaccess {:?} not legal for block column", reg.blockaccess),
        });
    }
    if !reg.instaccess.legal_for(AccessColumn::Inst) {
        errors.push(ValidatorError::IllegalAccessCombination {
            file: reg.common.source_file.clone(),
            line: reg.common.line,
            tag: "reg".to_string(),
            reason: format!("instaccess {:?} not legal for inst column", reg.instaccess),
        });
    }
    if !reg.busaccess.legal_for(AccessColumn::Bus) {
        errors.push(ValidatorError::IllegalAccessCombination {
            file: reg.common.source_file.clone(),
            line: reg.common.line,
            tag: "reg".to_string(),
            reason: format!("busaccess {:?} not legal for bus column", reg.busaccess),
        });
    }

    let has_event = reg.common.options.contains("EVENT");
    let has_setclear = reg.common.options.contains("SETCLEAR");
    if has_event && has_setclear {
        errors.push(ValidatorError::InconsistentCrossAttribute {
            file: reg.common.source_file.clone(),
            line: reg.common.line,
            tag: "reg".to_string(),
            reason: "EVENT and SETCLEAR are mutually exclusive expansions".to_string(),
        });
    }
    let has_level = reg.common.options.contains("HAS_LEVEL");
    let has_mode = reg.common.options.contains("HAS_MODE");
    if (has_level || has_mode) && !has_event {
        errors.push(ValidatorError::InconsistentCrossAttribute {
            file: reg.common.source_file.clone(),
            line: reg.common.line,
            tag: "reg".to_string(),
            reason: "HAS_LEVEL/HAS_MODE only apply to EVENT registers".to_string(),
        });
    }

    for field in &reg.fields {
        validate_field(field, errors);
    }
}

fn validate_field(field: &Field, errors: &mut Vec<ValidatorError>) {
    if let (Some(lsb), Some(msb)) = (&field.lsb, &field.msb) {
        if let (Ok(lsb_v), Ok(msb_v), Ok(width_v)) = (
            lsb.parse::<i64>(),
            msb.parse::<i64>(),
            field.width.parse::<i64>(),
        ) {
            if width_v != msb_v - lsb_v + 1 {
                errors.push(ValidatorError::InconsistentCrossAttribute {
                    file: field.common.source_file.clone(),
                    line: field.common.line,
                    tag: "field".to_string(),
                    reason: format!(
                        "width {width_v} does not match msb-lsb+1 ({msb_v}-{lsb_v}+1={})",
                        msb_v - lsb_v + 1
                    ),
                });
            }
        }
    }
}

fn validate_port(port: &Port, errors: &mut Vec<ValidatorError>) {
    check_options(
        &port.common.source_file,
        port.common.line,
        "port",
        &port.common.options,
        PORT_OPTIONS,
        errors,
    );
}

fn validate_his(his: &His, errors: &mut Vec<ValidatorError>) {
    for component in &his.components {
        match component {
            HisComponent::Port(port) => validate_port(port, errors),
            HisComponent::HisRef(hisref) => {
                check_options(
                    &hisref.common.source_file,
                    hisref.common.line,
                    "hisref",
                    &hisref.common.options,
                    PORT_OPTIONS,
                    errors,
                );
            }
        }
    }
}

fn validate_mod(m: &Mod, errors: &mut Vec<ValidatorError>) {
    check_options(
        &m.common.source_file,
        m.common.line,
        "mod",
        &m.common.options,
        MOD_OPTIONS,
        errors,
    );
    for hisref in &m.ports {
        check_options(
            &hisref.common.source_file,
            hisref.common.line,
            "hisref",
            &hisref.common.options,
            PORT_OPTIONS,
            errors,
        );
    }
    if m.common.options.contains("NO_CLK_RST") && m.clk_root.is_some() {
        errors.push(ValidatorError::InconsistentCrossAttribute {
            file: m.common.source_file.clone(),
            line: m.common.line,
            tag: "mod".to_string(),
            reason: "clk_root has no effect when NO_CLK_RST is set".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builder::build_records;
    use crate::schema::parser::parse_source;

    fn build(src: &str) -> Vec<SchemaRecord> {
        let raw = parse_source(src, "t.hw").unwrap();
        build_records(&raw).unwrap()
    }

    #[test]
    fn field_width_mismatch_is_rejected() {
        let recs = build("group G { reg R { field F { width: 4, lsb: 0, msb: 2 } } }");
        let errs = validate_all(&recs).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidatorError::InconsistentCrossAttribute { .. })));
    }

    #[test]
    fn field_width_match_is_accepted() {
        let recs = build("group G { reg R { field F { width: 3, lsb: 0, msb: 2 } } }");
        assert!(validate_all(&recs).is_ok());
    }

    #[test]
    fn unknown_reg_option_is_rejected() {
        let recs = build("group G { reg R { options: [BOGUS] } }");
        let errs = validate_all(&recs).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidatorError::IllegalOptionFlag { .. })));
    }

    #[test]
    fn event_and_setclear_together_is_rejected() {
        let recs = build("group G { reg R { options: [EVENT, SETCLEAR] } }");
        let errs = validate_all(&recs).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidatorError::InconsistentCrossAttribute { .. })));
    }

    #[test]
    fn his_port_unknown_option_is_rejected() {
        let recs = build("his H { port P { width: 1, role: master, options: [BOGUS] } }");
        let errs = validate_all(&recs).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ValidatorError::IllegalOptionFlag { .. })));
    }
}
