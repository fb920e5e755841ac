//! Function signatures for RPC resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgMode {
    In,
    Out,
    InOut,
    Variadic,
}

impl ArgMode {
    /// Whether the argument is supplied by the caller.
    pub fn is_input(&self) -> bool {
        matches!(self, ArgMode::In | ArgMode::InOut | ArgMode::Variadic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionArg {
    /// Empty for an unnamed parameter.
    pub name: String,
    pub data_type: String,
    pub mode: ArgMode,
    #[serde(default)]
    pub has_default: bool,
}

/// How results are shaped downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Scalar,
    SetOfScalars,
    Composite,
    SetOfComposites,
}

impl ResultKind {
    pub fn is_set(&self) -> bool {
        matches!(self, ResultKind::SetOfScalars | ResultKind::SetOfComposites)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, ResultKind::Composite | ResultKind::SetOfComposites)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub schema: String,
    pub name: String,
    pub args: Vec<FunctionArg>,
    pub return_type: String,
    /// True for `RETURNS SETOF ...` and `RETURNS TABLE (...)`.
    #[serde(default)]
    pub returns_set: bool,
    /// True when the return type is a composite, a TABLE row, a
    /// domain over a composite, or synthesized from OUT parameters.
    #[serde(default)]
    pub returns_composite: bool,
    pub volatility: Volatility,
}

impl Function {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Callable (IN/INOUT/VARIADIC) arguments, in declaration order.
    pub fn input_args(&self) -> impl Iterator<Item = &FunctionArg> {
        self.args.iter().filter(|a| a.mode.is_input())
    }

    /// The type of a single unnamed input parameter, if that is the shape.
    pub fn single_unnamed_type(&self) -> Option<&str> {
        let mut inputs = self.input_args();
        match (inputs.next(), inputs.next()) {
            (Some(arg), None) if arg.name.is_empty() => Some(&arg.data_type),
            _ => None,
        }
    }

    /// Classify the result shape once; the plan threads it through.
    pub fn result_kind(&self) -> ResultKind {
        match (self.returns_set, self.returns_composite) {
            (false, false) => ResultKind::Scalar,
            (true, false) => ResultKind::SetOfScalars,
            (false, true) => ResultKind::Composite,
            (true, true) => ResultKind::SetOfComposites,
        }
    }
}

impl fmt::Display for Function {
    /// `name(arg type, ...)`, the form used in error details and hints.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            if arg.mode == ArgMode::Out {
                write!(f, "OUT ")?;
            }
            if arg.name.is_empty() {
                write!(f, "{}", arg.data_type)?;
            } else {
                write!(f, "{} {}", arg.name, arg.data_type)?;
            }
        }
        write!(f, ")")
    }
}
