//! # Grammar Error Types
//!
//! Contract violations between a compiled grammar and the generator.
//! Build-time ones come out of `GrammarBuilder::build`; run-time ones are
//! logged by the generator and skip the offending branch.

use thiserror::Error;

use crate::grammar::ValueType;

/// Errors in a grammar's structure or in how it is evaluated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A field was used where another value type is required.
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Where the field is used.
        context: String,
        /// Required type.
        expected: ValueType,
        /// Actual type.
        found: ValueType,
    },

    /// A known pragma was given a value of the wrong kind.
    #[error("pragma '{pragma}' on '{symbol}' has the wrong kind")]
    InvalidPragma {
        /// Symbol carrying the pragma.
        symbol: String,
        /// Pragma name.
        pragma: String,
    },

    /// A node orientation has forward parallel to up.
    #[error("node '{node}' of component '{component}' has a degenerate orientation")]
    InvalidOrientation {
        /// Component name.
        component: String,
        /// Node name.
        node: String,
    },

    /// An expansion targets a node name the component does not have.
    #[error("there are no '{node}' nodes in the '{component}' component")]
    MissingNode {
        /// Component name.
        component: String,
        /// Requested node name.
        node: String,
    },

    /// A rule was referenced but never given any expansion or condition.
    #[error("rule '{0}' is referenced but never defined")]
    UndefinedRule(String),

    /// A component was referenced but declares nothing.
    #[error("component '{0}' is referenced but never defined")]
    UndefinedComponent(String),

    /// A declared parameter has neither a default nor a parent output.
    #[error("param value not defined for param '{0}'")]
    MissingParamValue(String),

    /// A parameter placeholder was sampled outside any context declaring it.
    #[error("param '{0}' is not bound in this context")]
    UnboundParam(String),
}

/// Result type for grammar operations.
pub type GrammarResult<T> = Result<T, GrammarError>;
