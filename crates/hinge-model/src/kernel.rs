//! Ground kernels: one instantiated rule's contribution to the objective.
//!
//! Every kernel is a [`LinearForm`] over atoms. A compatibility kernel
//! contributes the weighted hinge `weight · max(0, form)^p`; a constraint
//! kernel requires `form ⋈ 0` for a comparator `⋈`.

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule name given to synthetic clamping constraints.
pub const VALUE_CONSTRAINT_RULE: &str = "{value}";

// ============================================================================
// Linear Forms
// ============================================================================

/// `Σ coeff · atom + constant`.
///
/// An atom may appear in more than one summand; each occurrence is kept as
/// its own participation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearForm {
    pub terms: Vec<(Atom, f64)>,
    #[serde(default)]
    pub constant: f64,
}

impl LinearForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, atom: Atom, coeff: f64) -> Self {
        self.terms.push((atom, coeff));
        self
    }

    pub fn constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.terms.iter().map(|(a, _)| a)
    }

    pub fn evaluate<F>(&self, value_of: F) -> f64
    where
        F: Fn(&Atom) -> f64,
    {
        self.terms
            .iter()
            .fold(self.constant, |acc, (atom, coeff)| acc + coeff * value_of(atom))
    }
}

impl fmt::Display for LinearForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (atom, coeff) in &self.terms {
            write!(f, "{coeff:?}*{atom} + ")?;
        }
        write!(f, "{:?}", self.constant)
    }
}

// ============================================================================
// Ground Kernels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equality,
    LessEqual,
    GreaterEqual,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Equality => "==",
            Comparator::LessEqual => "<=",
            Comparator::GreaterEqual => ">=",
        };
        f.write_str(s)
    }
}

/// A ground rule instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroundKernel {
    /// Soft, weighted: `weight · max(0, form)^(1 or 2)`.
    Compatibility {
        rule: String,
        weight: f64,
        #[serde(default)]
        squared: bool,
        form: LinearForm,
    },
    /// Hard: `form ⋈ 0`.
    Constraint {
        rule: String,
        comparator: Comparator,
        form: LinearForm,
    },
}

impl GroundKernel {
    pub fn compatibility(rule: impl Into<String>, weight: f64, form: LinearForm) -> Self {
        GroundKernel::Compatibility {
            rule: rule.into(),
            weight,
            squared: false,
            form,
        }
    }

    pub fn squared_compatibility(rule: impl Into<String>, weight: f64, form: LinearForm) -> Self {
        GroundKernel::Compatibility {
            rule: rule.into(),
            weight,
            squared: true,
            form,
        }
    }

    pub fn constraint(rule: impl Into<String>, comparator: Comparator, form: LinearForm) -> Self {
        GroundKernel::Constraint {
            rule: rule.into(),
            comparator,
            form,
        }
    }

    /// `atom − value == 0`: pins `atom` to a previously computed value.
    pub fn value_constraint(atom: Atom, value: f64) -> Self {
        GroundKernel::Constraint {
            rule: VALUE_CONSTRAINT_RULE.to_string(),
            comparator: Comparator::Equality,
            form: LinearForm::new().term(atom, 1.0).constant(-value),
        }
    }

    pub fn rule(&self) -> &str {
        match self {
            GroundKernel::Compatibility { rule, .. } | GroundKernel::Constraint { rule, .. } => {
                rule
            }
        }
    }

    pub fn form(&self) -> &LinearForm {
        match self {
            GroundKernel::Compatibility { form, .. } | GroundKernel::Constraint { form, .. } => {
                form
            }
        }
    }

    /// Rule weight for compatibility kernels, `None` for constraints.
    pub fn weight(&self) -> Option<f64> {
        match self {
            GroundKernel::Compatibility { weight, .. } => Some(*weight),
            GroundKernel::Constraint { .. } => None,
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, GroundKernel::Constraint { .. })
    }

    pub fn is_value_constraint(&self) -> bool {
        self.is_constraint() && self.rule() == VALUE_CONSTRAINT_RULE
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.form().atoms()
    }

    /// Unweighted distance to satisfaction, `max(0, form)^p`. Zero for
    /// constraints.
    pub fn incompatibility<F>(&self, value_of: F) -> f64
    where
        F: Fn(&Atom) -> f64,
    {
        match self {
            GroundKernel::Compatibility { squared, form, .. } => {
                let hinge = form.evaluate(value_of).max(0.0);
                if *squared {
                    hinge * hinge
                } else {
                    hinge
                }
            }
            GroundKernel::Constraint { .. } => 0.0,
        }
    }

    /// Magnitude of the constraint violation. Zero for compatibility kernels.
    pub fn infeasibility<F>(&self, value_of: F) -> f64
    where
        F: Fn(&Atom) -> f64,
    {
        match self {
            GroundKernel::Constraint {
                comparator, form, ..
            } => {
                let v = form.evaluate(value_of);
                match comparator {
                    Comparator::Equality => v.abs(),
                    Comparator::LessEqual => v.max(0.0),
                    Comparator::GreaterEqual => (-v).max(0.0),
                }
            }
            GroundKernel::Compatibility { .. } => 0.0,
        }
    }

    /// Structural key used to ground each kernel into a solve at most once.
    pub fn key(&self) -> KernelKey {
        let (kind, weight) = match self {
            GroundKernel::Compatibility {
                weight, squared, ..
            } => (KernelKind::Compatibility { squared: *squared }, float_bits(*weight)),
            GroundKernel::Constraint { comparator, .. } => (KernelKind::Constraint(*comparator), 0),
        };
        let form = self.form();
        KernelKey {
            rule: self.rule().to_string(),
            kind,
            weight,
            terms: form
                .terms
                .iter()
                .map(|(atom, coeff)| (atom.clone(), float_bits(*coeff)))
                .collect(),
            constant: float_bits(form.constant),
        }
    }
}

impl fmt::Display for GroundKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroundKernel::Compatibility {
                rule,
                weight,
                squared,
                form,
            } => {
                let p = if *squared { 2 } else { 1 };
                write!(f, "{rule} ({weight:?}): max(0, {form})^{p}")
            }
            GroundKernel::Constraint {
                rule,
                comparator,
                form,
            } => write!(f, "{rule}: {form} {comparator} 0"),
        }
    }
}

/// Structural identity of a kernel. Floats compare by bit pattern, with
/// `-0.0` folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelKey {
    rule: String,
    kind: KernelKind,
    weight: u64,
    terms: Vec<(Atom, u64)>,
    constant: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum KernelKind {
    Compatibility { squared: bool },
    Constraint(Comparator),
}

fn float_bits(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else {
        x.to_bits()
    }
}

// ============================================================================
// Aggregate Metrics
// ============================================================================

/// `Σ weight · incompatibility` over the compatibility kernels.
pub fn total_weighted_incompatibility<'a, I, F>(kernels: I, value_of: F) -> f64
where
    I: IntoIterator<Item = &'a GroundKernel>,
    F: Fn(&Atom) -> f64,
{
    kernels
        .into_iter()
        .filter_map(|k| k.weight().map(|w| w * k.incompatibility(&value_of)))
        .sum()
}

/// `√(Σ infeasibility²)` over the constraint kernels.
pub fn infeasibility_norm<'a, I, F>(kernels: I, value_of: F) -> f64
where
    I: IntoIterator<Item = &'a GroundKernel>,
    F: Fn(&Atom) -> f64,
{
    kernels
        .into_iter()
        .map(|k| {
            let inf = k.infeasibility(&value_of);
            inf * inf
        })
        .sum::<f64>()
        .sqrt()
}
