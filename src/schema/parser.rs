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

//! Concrete-syntax parser: turns preprocessed text into a forest
//! of [`RawRecord`]s via a derive-macro `pest` grammar over tagged
//! mapping/sequence records. [`RawRecord`] is a generic, not-yet-typed record: duplicate and
//! unknown attributes are rejected here or in `builder.rs`, and the
//! mapping/sequence dual is resolved by `builder.rs`, not here.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::errors::SchemaError;

#[derive(Parser)]
#[grammar = "schema/grammar.pest"]
pub struct SchemaParser;

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    Str(String),
    Ident(String),
    Options(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawForm {
    /// `tag name { attr: value ... child { ... } }`
    Mapping {
        attrs: Vec<(String, RawValue, usize)>,
        children: Vec<RawRecord>,
    },
    /// `tag name(value1, value2, ...)`
    Sequence { values: Vec<RawValue> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub tag: String,
    pub name: Option<String>,
    pub file: String,
    pub line: usize,
    pub form: RawForm,
}

pub fn parse_source(source: &str, file: &str) -> Result<Vec<RawRecord>, SchemaError> {
    let pairs = SchemaParser::parse(Rule::program, source).map_err(|e| SchemaError::Syntax {
        file: file.to_string(),
        line: pest_error_line(&e),
        reason: e.to_string(),
    })?;

    let mut records = Vec::new();
    for pair in pairs {
        if pair.as_rule() == Rule::tag {
            records.push(build_raw_record(pair, file)?);
        }
    }
    Ok(records)
}

fn pest_error_line(err: &pest::error::Error<Rule>) -> usize {
    match err.line_col {
        pest::error::LineColLocation::Pos((line, _)) => line,
        pest::error::LineColLocation::Span((line, _), _) => line,
    }
}

fn build_raw_record(pair: Pair<Rule>, file: &str) -> Result<RawRecord, SchemaError> {
    let line = pair.as_span().start_pos().line_col().0;
    let mut inner = pair.into_inner();
    let tag_name_pair = inner.next().expect("tag always has a tag_name");
    let tag = tag_name_pair.as_str().to_string();

    let mut next = inner.next();
    let mut name = None;
    if let Some(p) = &next {
        if p.as_rule() == Rule::ident {
            name = Some(p.as_str().to_string());
            next = inner.next();
        }
    }

    let body = next.ok_or_else(|| SchemaError::Syntax {
        file: file.to_string(),
        line,
        reason: format!("tag '{tag}' has no body"),
    })?;

    let form = match body.as_rule() {
        Rule::mapping_body => build_mapping(body, file, &tag)?,
        Rule::sequence_body => build_sequence(body, file)?,
        other => {
            return Err(SchemaError::Syntax {
                file: file.to_string(),
                line,
                reason: format!("unexpected body rule {other:?}"),
            });
        }
    };

    Ok(RawRecord {
        tag,
        name,
        file: file.to_string(),
        line,
        form,
    })
}

fn build_mapping(pair: Pair<Rule>, file: &str, tag: &str) -> Result<RawForm, SchemaError> {
    let mut attrs = Vec::new();
    let mut children = Vec::new();
    for member in pair.into_inner() {
        let inner = member.into_inner().next().expect("member has one child");
        match inner.as_rule() {
            Rule::attribute => {
                let attr_line = inner.as_span().start_pos().line_col().0;
                let mut parts = inner.into_inner();
                let attr_name = parts.next().unwrap().as_str().to_string();
                let value_pair = parts.next().unwrap();
                let value = build_value(value_pair)?;
                if attrs.iter().any(|(n, _, _): &(String, RawValue, usize)| n == &attr_name) {
                    return Err(SchemaError::DuplicateAttribute {
                        file: file.to_string(),
                        line: attr_line,
                        tag: tag.to_string(),
                        attribute: attr_name,
                    });
                }
                attrs.push((attr_name, value, attr_line));
            }
            Rule::tag => {
                children.push(build_raw_record(inner, file)?);
            }
            other => {
                return Err(SchemaError::Syntax {
                    file: file.to_string(),
                    line: 0,
                    reason: format!("unexpected member rule {other:?}"),
                });
            }
        }
    }
    Ok(RawForm::Mapping { attrs, children })
}

fn build_sequence(pair: Pair<Rule>, _file: &str) -> Result<RawForm, SchemaError> {
    let mut values = Vec::new();
    for value_pair in pair.into_inner() {
        values.push(build_value(value_pair)?);
    }
    Ok(RawForm::Sequence { values })
}

fn build_value(pair: Pair<Rule>) -> Result<RawValue, SchemaError> {
    let inner = pair.into_inner().next().expect("value has one child");
    match inner.as_rule() {
        Rule::integer => {
            let text = inner.as_str();
            let parsed = if let Some(hex) = text.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).unwrap_or(0)
            } else if let Some(bin) = text.strip_prefix("0b") {
                i64::from_str_radix(bin, 2).unwrap_or(0)
            } else {
                text.parse().unwrap_or(0)
            };
            Ok(RawValue::Int(parsed))
        }
        Rule::string => {
            let text = inner.as_str();
            Ok(RawValue::Str(text[1..text.len() - 1].to_string()))
        }
        Rule::option_list => {
            let opts = inner.into_inner().map(|p| p.as_str().to_string()).collect();
            Ok(RawValue::Options(opts))
        }
        Rule::ident => Ok(RawValue::Ident(inner.as_str().to_string())),
        other => Err(SchemaError::Syntax {
            file: String::new(),
            line: 0,
            reason: format!("unexpected value rule {other:?}"),
        }),
    }
}
