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

//! Define/constant resolver: topologically sorts `Def` records by
//! name-reference and evaluates each right-hand side under the completed
//! environment. A cycle among Defs is a fatal error naming the cycle.

use std::collections::{HashMap, HashSet};

use crate::errors::ElaborateError;
use crate::graph::{Define as GraphDefine, Project};
use crate::preprocessor::expr::{self, DefineEnv};
use crate::schema::Def;

struct ResolvedEnv<'a> {
    resolved: &'a HashMap<String, i64>,
}

impl<'a> DefineEnv for ResolvedEnv<'a> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.resolved.get(name).map(|v| v.to_string())
    }
}

fn referenced_names(expr_text: &str, known: &HashSet<&str>) -> Vec<String> {
    let mut names = Vec::new();
    let chars: Vec<char> = expr_text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if known.contains(word.as_str()) {
                names.push(word);
            }
        } else {
            i += 1;
        }
    }
    names
}

/// Evaluates every `Def` to a graph [`Define`], in an order that respects
/// name-reference dependencies. Defines whose resolution order does not
/// matter (disjoint subgraphs) are evaluated in declaration order among
/// themselves, matching the order-independence guarantee.
pub fn resolve_defines(defs: &[&Def], project: &mut Project) -> Result<HashMap<String, i64>, ElaborateError> {
    let known: HashSet<&str> = defs.iter().map(|d| d.common.name.as_str()).collect();
    let deps: HashMap<&str, Vec<String>> = defs
        .iter()
        .map(|d| (d.common.name.as_str(), referenced_names(&d.value_expr, &known)))
        .collect();

    let mut resolved: HashMap<String, i64> = HashMap::new();
    let mut remaining: Vec<&Def> = defs.to_vec();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut next_round = Vec::new();
        for def in remaining {
            let name = def.common.name.as_str();
            let ready = deps[name].iter().all(|d| resolved.contains_key(d));
            if ready {
                let env = ResolvedEnv { resolved: &resolved };
                let value = expr::eval_int(&def.value_expr, &env, &def.common.source_file, def.common.line, &[])
                    .map_err(|_| ElaborateError::UndefinedReference {
                        kind: "define".to_string(),
                        name: name.to_string(),
                    })?;
                let value: i64 = value.try_into().map_err(|_| ElaborateError::UndefinedReference {
                    kind: "define".to_string(),
                    name: name.to_string(),
                })?;
                resolved.insert(name.to_string(), value);
            } else {
                next_round.push(def);
            }
        }
        if next_round.len() == before {
            let chain = next_round.iter().map(|d| d.common.name.clone()).collect::<Vec<_>>().join(" -> ");
            return Err(ElaborateError::Cycle { chain });
        }
        remaining = next_round;
    }

    for def in defs {
        let id = project.alloc_id();
        project.insert_define(GraphDefine {
            id,
            name: def.common.name.clone(),
            value: resolved[&def.common.name],
            attributes: Default::default(),
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Common;

    fn def(name: &str, expr: &str) -> Def {
        Def {
            common: Common {
                name: name.to_string(),
                ..Default::default()
            },
            value_expr: expr.to_string(),
        }
    }

    #[test]
    fn chained_defines_resolve() {
        let a = def("A", "3");
        let b = def("B", "5");
        let c = def("C", "A * B");
        let mut project = Project::new();
        let resolved = resolve_defines(&[&a, &b, &c], &mut project).unwrap();
        assert_eq!(resolved["C"], 15);
    }

    #[test]
    fn order_independent_for_acyclic_graph() {
        let a = def("A", "3");
        let b = def("B", "5");
        let c = def("C", "A * B");
        let mut project_fwd = Project::new();
        let resolved_fwd = resolve_defines(&[&a, &b, &c], &mut project_fwd).unwrap();
        let mut project_rev = Project::new();
        let resolved_rev = resolve_defines(&[&c, &b, &a], &mut project_rev).unwrap();
        assert_eq!(resolved_fwd["C"], resolved_rev["C"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = def("A", "B + 1");
        let b = def("B", "A + 1");
        let mut project = Project::new();
        let err = resolve_defines(&[&a, &b], &mut project).unwrap_err();
        assert!(matches!(err, ElaborateError::Cycle { .. }));
    }
}
