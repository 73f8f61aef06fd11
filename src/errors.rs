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

use thiserror::Error;

/// Errors raised while evaluating the text preprocessor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessorError {
    #[error("{file}:{line}: unbalanced directive nesting")]
    UnbalancedNesting { file: String, line: usize },

    #[error("{file}:{line}: unknown directive '{directive}'")]
    UnknownDirective {
        file: String,
        line: usize,
        directive: String,
    },

    #[error("{file}:{line}: undefined name '{name}' in expression")]
    UndefinedName {
        file: String,
        line: usize,
        name: String,
    },

    #[error("{file}:{line}: expected integer result, got {found}")]
    NonIntegerResult {
        file: String,
        line: usize,
        found: String,
    },

    #[error("{file}:{line}: include file not found: '{path}'")]
    IncludeNotFound {
        file: String,
        line: usize,
        path: String,
    },

    #[error("{file}:{line}: cyclic include detected at '{path}'")]
    CyclicInclude {
        file: String,
        line: usize,
        path: String,
    },

    #[error("{file}:{line}: duplicate file name '{name}' in scope")]
    DuplicateFileName {
        file: String,
        line: usize,
        name: String,
    },

    #[error("{file}:{line}: failed to evaluate expression: {reason}")]
    ExpressionFailure {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{file}:{line}: '#for' iterable is not finite: {reason}")]
    InfiniteIterable {
        file: String,
        line: usize,
        reason: String,
    },
}

/// Errors raised while parsing preprocessed text into schema records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("{file}:{line}: unknown tag '{tag}'")]
    UnknownTag {
        file: String,
        line: usize,
        tag: String,
    },

    #[error("{file}:{line}: unknown attribute '{attribute}' on tag '{tag}'")]
    UnknownAttribute {
        file: String,
        line: usize,
        tag: String,
        attribute: String,
    },

    #[error("{file}:{line}: duplicate attribute '{attribute}' on tag '{tag}'")]
    DuplicateAttribute {
        file: String,
        line: usize,
        tag: String,
        attribute: String,
    },

    #[error(
        "{file}:{line}: wrong value type for attribute '{attribute}' on tag '{tag}': expected {expected}"
    )]
    WrongValueType {
        file: String,
        line: usize,
        tag: String,
        attribute: String,
        expected: String,
    },

    #[error("{file}:{line}: syntax error: {reason}")]
    Syntax {
        file: String,
        line: usize,
        reason: String,
    },
}

/// Errors raised while validating a schema record tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidatorError {
    #[error("{file}:{line}: illegal child kind '{child}' under '{parent}'")]
    IllegalChildKind {
        file: String,
        line: usize,
        parent: String,
        child: String,
    },

    #[error("{file}:{line}: illegal option flag '{flag}' on tag '{tag}'")]
    IllegalOptionFlag {
        file: String,
        line: usize,
        tag: String,
        flag: String,
    },

    #[error("{file}:{line}: inconsistent cross-attribute on '{tag}': {reason}")]
    InconsistentCrossAttribute {
        file: String,
        line: usize,
        tag: String,
        reason: String,
    },

    #[error("{file}:{line}: illegal access combination on '{tag}': {reason}")]
    IllegalAccessCombination {
        file: String,
        line: usize,
        tag: String,
        reason: String,
    },
}

/// Errors raised by the elaboration stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElaborateError {
    #[error("undefined reference to {kind} '{name}'")]
    UndefinedReference { kind: String, name: String },

    #[error("register address overlap between '{a}' and '{b}' ({a_range:?} vs {b_range:?})")]
    AddressOverlap {
        a: String,
        b: String,
        a_range: (u64, u64),
        b_range: (u64, u64),
    },

    #[error("field bit overlap between '{a}' and '{b}' on register '{reg}'")]
    FieldOverlap { reg: String, a: String, b: String },

    #[error("cyclic reference detected: {chain}")]
    Cycle { chain: String },

    #[error("ambiguous many-to-many connection: {reason}")]
    AmbiguousConnection { reason: String },

    #[error("principal {kind} port not found on block '{block}'")]
    PrincipalPortNotFound { kind: String, block: String },

    #[error("address not reachable: {reason}")]
    AddressUnreachable { reason: String },
}

/// Errors raised by the rule checker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckerError {
    #[error("critical rule violation in '{check_name}' on node {node_id}: {message}")]
    Critical {
        node_id: u64,
        check_name: String,
        message: String,
    },
}

/// Top-level aggregate error type returned across stage boundaries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElabStageError {
    #[error(transparent)]
    Preprocessor(#[from] PreprocessorError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Elaborate(#[from] ElaborateError),
    #[error(transparent)]
    Checker(#[from] CheckerError),
}
