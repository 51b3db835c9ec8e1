//! Type errors raised by inference.
//!
//! Every error carries the location of the node that raised it. The first
//! error aborts the run; there is no local recovery.

use std::fmt;

use garnet_common::Location;
use serde::Serialize;

/// The four classes of failure an inference run can end with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No definition matches a call, constant or delegation.
    UnresolvedCall,
    /// A value is narrower or wider than an operation accepts.
    TypeMismatch,
    /// A local variable is read before any assignment reaches it.
    UninitializedRead,
    /// A fixpoint did not settle within its bound. A compiler defect, not a
    /// user error.
    NonConvergent,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum TypeError {
    /// No method `name` on `receiver`.
    UndefinedMethod {
        name: String,
        receiver: String,
        location: Option<Location>,
    },
    /// A method exists but no overload takes this many arguments.
    WrongArgumentCount {
        name: String,
        expected: String,
        found: usize,
        location: Option<Location>,
    },
    /// A constant path names nothing.
    UndefinedConstant {
        name: String,
        location: Option<Location>,
    },
    /// `super` with no ancestor defining the enclosing method.
    NoSuperMethod {
        name: String,
        owner: String,
        location: Option<Location>,
    },
    /// `yield` in a method called without a block.
    NoBlockGiven {
        method: String,
        location: Option<Location>,
    },
    Mismatch {
        expected: String,
        found: String,
        context: String,
        location: Option<Location>,
    },
    UninitializedRead {
        name: String,
        location: Option<Location>,
    },
    NonConvergent {
        what: String,
        passes: u32,
        location: Option<Location>,
    },
    /// Calls kept opening new specializations, each inside the last.
    SpecializationOverflow {
        name: String,
        depth: u32,
        location: Option<Location>,
    },
}

impl TypeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TypeError::UndefinedMethod { .. }
            | TypeError::WrongArgumentCount { .. }
            | TypeError::UndefinedConstant { .. }
            | TypeError::NoSuperMethod { .. }
            | TypeError::NoBlockGiven { .. } => ErrorKind::UnresolvedCall,
            TypeError::Mismatch { .. } => ErrorKind::TypeMismatch,
            TypeError::UninitializedRead { .. } => ErrorKind::UninitializedRead,
            TypeError::NonConvergent { .. } | TypeError::SpecializationOverflow { .. } => {
                ErrorKind::NonConvergent
            }
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            TypeError::UndefinedMethod { location, .. }
            | TypeError::WrongArgumentCount { location, .. }
            | TypeError::UndefinedConstant { location, .. }
            | TypeError::NoSuperMethod { location, .. }
            | TypeError::NoBlockGiven { location, .. }
            | TypeError::Mismatch { location, .. }
            | TypeError::UninitializedRead { location, .. }
            | TypeError::NonConvergent { location, .. }
            | TypeError::SpecializationOverflow { location, .. } => location.as_ref(),
        }
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            TypeError::UndefinedMethod { .. } => "E0001",
            TypeError::WrongArgumentCount { .. } => "E0002",
            TypeError::UndefinedConstant { .. } => "E0003",
            TypeError::NoSuperMethod { .. } => "E0004",
            TypeError::NoBlockGiven { .. } => "E0005",
            TypeError::Mismatch { .. } => "E0006",
            TypeError::UninitializedRead { .. } => "E0007",
            TypeError::NonConvergent { .. } => "ICE0001",
            TypeError::SpecializationOverflow { .. } => "ICE0002",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::NonConvergent
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::UndefinedMethod { name, receiver, .. } => {
                write!(f, "undefined method '{}' for {}", name, receiver)
            }
            TypeError::WrongArgumentCount {
                name,
                expected,
                found,
                ..
            } => write!(
                f,
                "wrong number of arguments for '{}' ({} for {})",
                name, found, expected
            ),
            TypeError::UndefinedConstant { name, .. } => {
                write!(f, "undefined constant {}", name)
            }
            TypeError::NoSuperMethod { name, owner, .. } => {
                write!(f, "no superclass method '{}' for {}", name, owner)
            }
            TypeError::NoBlockGiven { method, .. } => {
                write!(f, "'{}' yields but was called without a block", method)
            }
            TypeError::Mismatch {
                expected,
                found,
                context,
                ..
            } => write!(f, "{}: expected {}, found {}", context, expected, found),
            TypeError::UninitializedRead { name, .. } => {
                write!(f, "read of '{}' before it is assigned", name)
            }
            TypeError::NonConvergent { what, passes, .. } => write!(
                f,
                "inference of {} did not converge after {} passes",
                what, passes
            ),
            TypeError::SpecializationOverflow { name, depth, .. } => write!(
                f,
                "specializations of '{}' nested more than {} deep",
                name, depth
            ),
        }
    }
}

impl std::error::Error for TypeError {}
