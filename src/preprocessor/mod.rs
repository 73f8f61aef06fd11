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

//! Text preprocessor: a lazy, file-scoped, C-style macro layer over
//! arbitrary text. A [`Scope`] owns every named [`File`]'s
//! content and a mutable `defines` environment; evaluation of one file is
//! triggered externally and `#include` evaluates another file's result
//! in-place, recursively, threading an `include_stack: HashSet<PathBuf>`
//! through recursive file evaluation.

pub mod expr;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::PreprocessorError;
use crate::file_reader::FileReader;
use expr::{DefineEnv, Value};

pub type PResult<T> = Result<T, PreprocessorError>;

/// One value bound by an initial `defines` entry passed to [`crate::build_project`].
#[derive(Debug, Clone, PartialEq)]
pub enum DefineValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl DefineValue {
    fn to_expr_text(&self) -> String {
        match self {
            DefineValue::Int(i) => i.to_string(),
            DefineValue::Bool(b) => b.to_string(),
            DefineValue::Str(s) => format!("\"{s}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Expr(String),
    Defined(String),
    NotDefined(String),
}

#[derive(Debug, Clone)]
struct IfBranch {
    predicate: Option<Predicate>,
    body: Vec<Node>,
}

/// A parsed, not-yet-evaluated line or block of a [`File`]. Directive
/// blocks (`#if`/`#ifdef`/`#ifndef`/`#for`) nest their children here;
/// `#define`/`#include` are leaf nodes evaluated in declaration order.
#[derive(Debug, Clone)]
enum Node {
    Text { content: String, line: usize },
    Define { name: String, expr: String, line: usize },
    Include { path: String, line: usize },
    If { branches: Vec<IfBranch>, line: usize },
    For { var: String, iterable_expr: String, body: Vec<Node>, line: usize },
}

enum StopTok {
    Elif(String),
    Else,
    Endif,
    Endfor,
    Eof,
}

/// Owns the defines environment and lazily parsed/evaluated files for one
/// preprocessing run. File names are unique within a `Scope`.
pub struct Scope {
    file_paths: HashMap<String, PathBuf>,
    parsed: RefCell<HashMap<String, Vec<Node>>>,
    defines: RefCell<HashMap<String, String>>,
    deps: RefCell<Vec<PathBuf>>,
}

impl DefineEnv for Scope {
    fn lookup(&self, name: &str) -> Option<String> {
        self.defines.borrow().get(name).cloned()
    }
}

impl Scope {
    fn new(file_paths: HashMap<String, PathBuf>, defines: HashMap<String, String>) -> Self {
        Self {
            file_paths,
            parsed: RefCell::new(HashMap::new()),
            defines: RefCell::new(defines),
            deps: RefCell::new(Vec::new()),
        }
    }

    fn ensure_parsed<F: FileReader>(&self, name: &str, reader: &F) -> PResult<()> {
        if self.parsed.borrow().contains_key(name) {
            return Ok(());
        }
        let path = self
            .file_paths
            .get(name)
            .ok_or_else(|| PreprocessorError::IncludeNotFound {
                file: name.to_string(),
                line: 0,
                path: name.to_string(),
            })?
            .clone();
        let text = reader
            .read_to_string(&path)
            .map_err(|_| PreprocessorError::IncludeNotFound {
                file: name.to_string(),
                line: 0,
                path: path.display().to_string(),
            })?;
        self.deps.borrow_mut().push(path);
        let lines: Vec<(usize, String)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.to_string()))
            .collect();
        let mut pos = 0;
        let (nodes, _stop) = parse_seq(&lines, &mut pos, name)?;
        self.parsed.borrow_mut().insert(name.to_string(), nodes);
        Ok(())
    }

    fn evaluate_file<F: FileReader>(
        &self,
        name: &str,
        stack: &mut HashSet<String>,
        reader: &F,
    ) -> PResult<Vec<String>> {
        if stack.contains(name) {
            return Err(PreprocessorError::CyclicInclude {
                file: name.to_string(),
                line: 0,
                path: name.to_string(),
            });
        }
        self.ensure_parsed(name, reader)?;
        stack.insert(name.to_string());
        let nodes = self.parsed.borrow().get(name).cloned().unwrap();
        let mut output = Vec::new();
        let result = self.evaluate_nodes(&nodes, name, &[], &mut output, stack, reader);
        stack.remove(name);
        result?;
        Ok(output)
    }

    fn evaluate_nodes<F: FileReader>(
        &self,
        nodes: &[Node],
        file: &str,
        loop_vars: &[(String, Value)],
        output: &mut Vec<String>,
        stack: &mut HashSet<String>,
        reader: &F,
    ) -> PResult<()> {
        for node in nodes {
            match node {
                Node::Text { content, line } => {
                    output.push(substitute_line(content, self, loop_vars, file, *line)?);
                }
                Node::Define { name, expr, .. } => {
                    self.defines.borrow_mut().insert(name.clone(), expr.clone());
                }
                Node::Include { path, line } => {
                    let target = strip_quotes(path);
                    let included = self.evaluate_file(&target, stack, reader).map_err(|e| {
                        if let PreprocessorError::CyclicInclude { path, .. } = &e {
                            PreprocessorError::CyclicInclude {
                                file: file.to_string(),
                                line: *line,
                                path: path.clone(),
                            }
                        } else {
                            e
                        }
                    })?;
                    output.extend(included);
                }
                Node::If { branches, line } => {
                    for branch in branches {
                        let take = match &branch.predicate {
                            None => true,
                            Some(Predicate::Expr(e)) => {
                                expr::eval_bool(e, self, file, *line, loop_vars)?
                            }
                            Some(Predicate::Defined(n)) => self.defines.borrow().contains_key(n),
                            Some(Predicate::NotDefined(n)) => {
                                !self.defines.borrow().contains_key(n)
                            }
                        };
                        if take {
                            self.evaluate_nodes(
                                &branch.body,
                                file,
                                loop_vars,
                                output,
                                stack,
                                reader,
                            )?;
                            break;
                        }
                    }
                }
                Node::For {
                    var,
                    iterable_expr,
                    body,
                    line,
                } => {
                    let value = expr::eval_str(iterable_expr, self, file, *line, loop_vars)?;
                    let items = match value {
                        Value::List(items) => items,
                        _ => {
                            return Err(PreprocessorError::InfiniteIterable {
                                file: file.to_string(),
                                line: *line,
                                reason: "#for iterable must evaluate to a finite list".to_string(),
                            });
                        }
                    };
                    for item in items {
                        let mut extended = loop_vars.to_vec();
                        extended.push((var.clone(), item));
                        self.evaluate_nodes(body, file, &extended, output, stack, reader)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn deps(&self) -> Vec<PathBuf> {
        self.deps.borrow().clone()
    }
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn split_keyword(directive: &str) -> (&str, &str) {
    let directive = directive.trim_start();
    match directive.find(char::is_whitespace) {
        Some(idx) => (&directive[..idx], directive[idx..].trim_start()),
        None => (directive, ""),
    }
}

fn parse_seq(
    lines: &[(usize, String)],
    pos: &mut usize,
    file: &str,
) -> PResult<(Vec<Node>, StopTok)> {
    let mut nodes = Vec::new();
    loop {
        if *pos >= lines.len() {
            return Ok((nodes, StopTok::Eof));
        }
        let (line_no, raw) = lines[*pos].clone();
        let trimmed = raw.trim();
        if let Some(rest_all) = trimmed.strip_prefix('#') {
            let (kw, rest) = split_keyword(rest_all);
            match kw {
                "elif" => {
                    *pos += 1;
                    return Ok((nodes, StopTok::Elif(rest.trim().to_string())));
                }
                "else" => {
                    *pos += 1;
                    return Ok((nodes, StopTok::Else));
                }
                "endif" => {
                    *pos += 1;
                    return Ok((nodes, StopTok::Endif));
                }
                "endfor" => {
                    *pos += 1;
                    return Ok((nodes, StopTok::Endfor));
                }
                "define" => {
                    *pos += 1;
                    let (name, expr) = parse_define_header(rest, file, line_no)?;
                    nodes.push(Node::Define {
                        name,
                        expr,
                        line: line_no,
                    });
                }
                "include" => {
                    *pos += 1;
                    nodes.push(Node::Include {
                        path: rest.trim().to_string(),
                        line: line_no,
                    });
                }
                "if" => {
                    *pos += 1;
                    let branches =
                        parse_if_chain(lines, pos, file, Predicate::Expr(rest.trim().to_string()))?;
                    nodes.push(Node::If {
                        branches,
                        line: line_no,
                    });
                }
                "ifdef" => {
                    *pos += 1;
                    let branches = parse_if_chain(
                        lines,
                        pos,
                        file,
                        Predicate::Defined(rest.trim().to_string()),
                    )?;
                    nodes.push(Node::If {
                        branches,
                        line: line_no,
                    });
                }
                "ifndef" => {
                    *pos += 1;
                    let branches = parse_if_chain(
                        lines,
                        pos,
                        file,
                        Predicate::NotDefined(rest.trim().to_string()),
                    )?;
                    nodes.push(Node::If {
                        branches,
                        line: line_no,
                    });
                }
                "for" => {
                    *pos += 1;
                    let (var, iterable) = parse_for_header(rest, file, line_no)?;
                    let (body, stop) = parse_seq(lines, pos, file)?;
                    match stop {
                        StopTok::Endfor => {}
                        _ => {
                            return Err(PreprocessorError::UnbalancedNesting {
                                file: file.to_string(),
                                line: line_no,
                            });
                        }
                    }
                    nodes.push(Node::For {
                        var,
                        iterable_expr: iterable,
                        body,
                        line: line_no,
                    });
                }
                other => {
                    return Err(PreprocessorError::UnknownDirective {
                        file: file.to_string(),
                        line: line_no,
                        directive: other.to_string(),
                    });
                }
            }
        } else {
            nodes.push(Node::Text {
                content: raw.to_string(),
                line: line_no,
            });
            *pos += 1;
        }
    }
}

fn parse_if_chain(
    lines: &[(usize, String)],
    pos: &mut usize,
    file: &str,
    first_predicate: Predicate,
) -> PResult<Vec<IfBranch>> {
    let mut branches = Vec::new();
    let mut current = Some(first_predicate);
    let mut seen_else = false;
    loop {
        let (body, stop) = parse_seq(lines, pos, file)?;
        branches.push(IfBranch {
            predicate: current.take(),
            body,
        });
        match stop {
            StopTok::Elif(expr) => {
                if seen_else {
                    return Err(PreprocessorError::UnbalancedNesting {
                        file: file.to_string(),
                        line: 0,
                    });
                }
                current = Some(Predicate::Expr(expr));
            }
            StopTok::Else => {
                if seen_else {
                    return Err(PreprocessorError::UnbalancedNesting {
                        file: file.to_string(),
                        line: 0,
                    });
                }
                seen_else = true;
                current = None;
            }
            StopTok::Endif => break,
            StopTok::Endfor | StopTok::Eof => {
                return Err(PreprocessorError::UnbalancedNesting {
                    file: file.to_string(),
                    line: 0,
                });
            }
        }
    }
    Ok(branches)
}

fn parse_define_header(rest: &str, file: &str, line: usize) -> PResult<(String, String)> {
    let rest = rest.trim();
    match rest.find(char::is_whitespace) {
        Some(idx) => Ok((rest[..idx].to_string(), rest[idx..].trim().to_string())),
        None => Err(PreprocessorError::ExpressionFailure {
            file: file.to_string(),
            line,
            reason: "#define requires a name and an expression".to_string(),
        }),
    }
}

fn parse_for_header(rest: &str, file: &str, line: usize) -> PResult<(String, String)> {
    let rest = rest.trim();
    let without_for = rest;
    let parts: Vec<&str> = without_for.splitn(2, " in ").collect();
    if parts.len() != 2 {
        return Err(PreprocessorError::ExpressionFailure {
            file: file.to_string(),
            line,
            reason: "#for requires 'var in iterable'".to_string(),
        });
    }
    Ok((parts[0].trim().to_string(), parts[1].trim().to_string()))
}

fn find_closing(chars: &[char], start: usize, close: char) -> Option<usize> {
    let mut i = start;
    while i < chars.len() {
        if chars[i] == close {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_matching_paren(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1i32;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Applies substitution rules (a) `<NAME>`, (b) `$(expr)`, and (c) bare
/// recognized-define-name replacement in a single left-to-right pass.
fn substitute_line(
    line: &str,
    scope: &Scope,
    loop_vars: &[(String, Value)],
    file: &str,
    line_no: usize,
) -> PResult<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut out = String::new();
    while i < chars.len() {
        if chars[i] == '<' {
            if let Some(end) = find_closing(&chars, i + 1, '>') {
                let inner: String = chars[i + 1..end].iter().collect();
                let value = expr::eval_str(&inner, scope, file, line_no, loop_vars)?;
                out.push_str(&value.to_string());
                i = end + 1;
                continue;
            }
        }
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '(' {
            if let Some(end) = find_matching_paren(&chars, i + 2) {
                let inner: String = chars[i + 2..end].iter().collect();
                let value = expr::eval_str(&inner, scope, file, line_no, loop_vars)?;
                out.push_str(&value.to_string());
                i = end + 1;
                continue;
            }
        }
        if chars[i].is_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if scope.defines.borrow().contains_key(&ident) {
                let value = expr::eval_str(&ident, scope, file, line_no, loop_vars)?;
                out.push_str(&value.to_string());
            } else {
                out.push_str(&ident);
            }
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(out)
}

/// Recursively lists every file under `dir`, keyed by file name (matching
/// `includes` directory entries being "scanned recursively").
fn scan_dir<F: FileReader>(
    _reader: &F,
    dir: &Path,
    out: &mut HashMap<String, PathBuf>,
) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_dir(_reader, &path, out)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            out.insert(name.to_string(), path);
        }
    }
    Ok(())
}

/// Result of a full preprocessing run: the flattened output lines and the
/// dependency file list (every file the preprocessor opened).
pub struct PreprocessResult {
    pub lines: Vec<String>,
    pub deps: Vec<PathBuf>,
}

/// Runs the preprocessor over `top_file`, honoring `includes` search-path
/// entries (directories scanned recursively, or explicit file paths) and
/// seeding the defines environment from `defines` (`build_project` options).
pub fn preprocess<F: FileReader>(
    top_file: &Path,
    includes: &[PathBuf],
    defines: &HashMap<String, DefineValue>,
    reader: &F,
) -> PResult<PreprocessResult> {
    let mut file_paths = HashMap::new();
    for entry in includes {
        if entry.is_dir() {
            let _ = scan_dir(reader, entry, &mut file_paths);
        } else if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
            file_paths.insert(name.to_string(), entry.clone());
        }
    }
    let top_name = top_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("top")
        .to_string();
    file_paths.insert(top_name.clone(), top_file.to_path_buf());

    let initial_defines: HashMap<String, String> = defines
        .iter()
        .map(|(k, v)| (k.clone(), v.to_expr_text()))
        .collect();

    let scope = Scope::new(file_paths, initial_defines);
    let mut stack = HashSet::new();
    let lines = scope.evaluate_file(&top_name, &mut stack, reader)?;
    Ok(PreprocessResult {
        lines,
        deps: scope.deps(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    fn run(source: &str) -> Vec<String> {
        let mut reader = MockFileReader::default();
        reader.add_file("top.txt", source);
        let result = preprocess(
            Path::new("top.txt"),
            &[],
            &HashMap::new(),
            &reader,
        )
        .unwrap();
        result.lines
    }

    #[test]
    fn define_arithmetic_scenario() {
        let out = run("#define VAL_1 3\n#define VAL_2 5\n#define VAL_3 (VAL_1 * VAL_2)\nresult=<VAL_3>\n");
        assert_eq!(out, vec!["result=15"]);
    }

    #[test]
    fn for_loop_arithmetic_scenario() {
        let out = run("#define MAX 3\n#for i in range(MAX)\n v=$(i*2)\n#endfor\n");
        assert_eq!(out, vec![" v=0", " v=2", " v=4"]);
    }

    #[test]
    fn if_else_selects_one_branch() {
        let out = run("#define FLAG 1\n#if FLAG == 1\nyes\n#else\nno\n#endif\n");
        assert_eq!(out, vec!["yes"]);
    }

    #[test]
    fn ifdef_tests_presence() {
        let out = run("#define FOO 1\n#ifdef FOO\nhas_foo\n#endif\n#ifndef BAR\nno_bar\n#endif\n");
        assert_eq!(out, vec!["has_foo", "no_bar"]);
    }

    #[test]
    fn include_inlines_other_file() {
        let mut reader = MockFileReader::default();
        reader.add_file("top.txt", "before\n#include \"inc.txt\"\nafter\n");
        reader.add_file("inc.txt", "included\n");
        let result = preprocess(Path::new("top.txt"), &[], &HashMap::new(), &reader).unwrap();
        assert_eq!(result.lines, vec!["before", "included", "after"]);
    }

    #[test]
    fn cyclic_include_is_rejected() {
        let mut reader = MockFileReader::default();
        reader.add_file("a.txt", "#include \"b.txt\"\n");
        reader.add_file("b.txt", "#include \"a.txt\"\n");
        let err = preprocess(Path::new("a.txt"), &[], &HashMap::new(), &reader).unwrap_err();
        assert!(matches!(err, PreprocessorError::CyclicInclude { .. }));
    }

    #[test]
    fn unknown_directive_errors() {
        let mut reader = MockFileReader::default();
        reader.add_file("top.txt", "#bogus\n");
        let err = preprocess(Path::new("top.txt"), &[], &HashMap::new(), &reader).unwrap_err();
        assert!(matches!(err, PreprocessorError::UnknownDirective { .. }));
    }

    #[test]
    fn idempotent_on_plain_output() {
        let out = run("#define A 2\nresult=<A>\n");
        // Evaluating the already-substituted output a second time is a fixpoint:
        // it contains no directives or substitution forms left to expand.
        let second = run(&out.join("\n"));
        assert_eq!(out, second);
    }
}
