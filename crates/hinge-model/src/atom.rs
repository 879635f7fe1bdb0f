//! Ground atoms: a predicate applied to concrete arguments.
//!
//! An [`Atom`] is pure identity. Its truth value and kind live in the store,
//! so atoms can be cloned freely (one `Arc` bump) and used as map keys in
//! every layer without creating back-references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Arguments
// ============================================================================

/// A concrete argument of a ground atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Int(i64),
    Str(String),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Int(i) => write!(f, "{i}"),
            Argument::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument::Str(s.to_string())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument::Str(s)
    }
}

impl From<i64> for Argument {
    fn from(i: i64) -> Self {
        Argument::Int(i)
    }
}

// ============================================================================
// Atoms
// ============================================================================

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct AtomInner {
    predicate: String,
    args: Vec<Argument>,
}

/// Structural identity of a ground atom: `(predicate, arguments)`.
///
/// Equality, hashing and ordering are structural. The derived ordering
/// (predicate name, then arguments) is the total order used for every
/// deterministic tie-break in the activation layer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "AtomRef", into = "AtomRef")]
pub struct Atom(Arc<AtomInner>);

impl Atom {
    pub fn new(predicate: impl Into<String>, args: Vec<Argument>) -> Self {
        Self(Arc::new(AtomInner {
            predicate: predicate.into(),
            args,
        }))
    }

    pub fn predicate(&self) -> &str {
        &self.0.predicate
    }

    pub fn args(&self) -> &[Argument] {
        &self.0.args
    }

    pub fn arity(&self) -> usize {
        self.0.args.len()
    }

    /// The unresolved reference a caller would use to name this atom.
    pub fn to_ref(&self) -> AtomRef {
        AtomRef {
            predicate: self.0.predicate.clone(),
            args: self.0.args.clone(),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate())?;
        for (i, arg) in self.args().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A caller-side reference to an atom that still has to be resolved against
/// a store (seed sets, model files, store diffs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomRef {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl AtomRef {
    pub fn new(predicate: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }
}

impl fmt::Display for AtomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.predicate, args.join(", "))
    }
}

impl From<AtomRef> for Atom {
    fn from(r: AtomRef) -> Self {
        Atom::new(r.predicate, r.args)
    }
}

impl From<Atom> for AtomRef {
    fn from(a: Atom) -> Self {
        a.to_ref()
    }
}

/// Whether the solver may change an atom's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomKind {
    /// Inferred; its value is written back after each solve.
    RandomVariable,
    /// Fixed evidence.
    Observed,
}

/// An atom together with its kind and current truth value in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub atom: Atom,
    pub kind: AtomKind,
    pub value: f64,
}

impl AtomRecord {
    pub fn is_random_variable(&self) -> bool {
        self.kind == AtomKind::RandomVariable
    }
}

/// Build an [`Atom`] from a predicate and a list of arguments.
///
/// ```
/// use hinge_model::atom;
/// let a = atom!("Friends", "alice", "bob");
/// assert_eq!(a.to_string(), "Friends(alice, bob)");
/// ```
#[macro_export]
macro_rules! atom {
    ($pred:expr $(, $arg:expr)* $(,)?) => {
        $crate::Atom::new($pred, vec![$($crate::Argument::from($arg)),*])
    };
}
