//! Hand-built consensus states for unit tests.

use ahash::AHashMap;
use hinge_admm::{ConsensusView, TermId, VariableLocation};
use hinge_model::{Atom, Comparator, GroundKernel, LinearForm};

struct StaticTerm {
    kernel: GroundKernel,
    variables: Vec<usize>,
    duals: Vec<f64>,
    weight: Option<f64>,
}

/// A [`ConsensusView`] whose variables, duals and terms are set directly.
#[derive(Default)]
pub(crate) struct StaticView {
    atoms: Vec<Atom>,
    index: AHashMap<Atom, usize>,
    z: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    locations: Vec<Vec<VariableLocation>>,
    terms: Vec<StaticTerm>,
    observed: Vec<(Atom, f64)>,
}

impl StaticView {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn variable(&mut self, atom: Atom, value: f64) {
        self.index.insert(atom.clone(), self.atoms.len());
        self.atoms.push(atom);
        self.z.push(value);
        self.lower.push(0.0);
        self.upper.push(1.0);
        self.locations.push(Vec::new());
    }

    pub(crate) fn observed(&mut self, atom: Atom, value: f64) {
        self.observed.push((atom, value));
    }

    pub(crate) fn compatibility(&mut self, weight: f64, form: &[(Atom, f64)], duals: &[f64]) {
        self.kernel(GroundKernel::compatibility("r", weight, linear(form)), duals);
    }

    pub(crate) fn constraint(&mut self, comparator: Comparator, form: &[(Atom, f64)], duals: &[f64]) {
        self.kernel(GroundKernel::constraint("c", comparator, linear(form)), duals);
    }

    /// `duals` holds one value per variable occurrence in the form, in order.
    pub(crate) fn kernel(&mut self, kernel: GroundKernel, duals: &[f64]) {
        let weight = kernel.weight();
        let term = self.terms.len();
        let variables: Vec<usize> = kernel
            .atoms()
            .filter_map(|a| self.index.get(a).copied())
            .collect();
        assert_eq!(variables.len(), duals.len(), "one dual per variable occurrence");
        for (local, &v) in variables.iter().enumerate() {
            self.locations[v].push(VariableLocation { term, local });
        }
        self.terms.push(StaticTerm {
            kernel,
            variables,
            duals: duals.to_vec(),
            weight,
        });
    }
}

fn linear(form: &[(Atom, f64)]) -> LinearForm {
    form.iter()
        .fold(LinearForm::new(), |f, (a, c)| f.term(a.clone(), *c))
}

impl ConsensusView for StaticView {
    fn variables(&self) -> &[Atom] {
        &self.atoms
    }

    fn consensus(&self) -> &[f64] {
        &self.z
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    fn locations(&self, variable: usize) -> &[VariableLocation] {
        &self.locations[variable]
    }

    fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn term_variables(&self, term: TermId) -> &[usize] {
        &self.terms[term].variables
    }

    fn term_duals(&self, term: TermId) -> &[f64] {
        &self.terms[term].duals
    }

    fn term_weight(&self, term: TermId) -> Option<f64> {
        self.terms[term].weight
    }

    fn term_kernel(&self, term: TermId) -> &GroundKernel {
        &self.terms[term].kernel
    }

    fn observed_values(&self) -> Vec<(Atom, f64)> {
        self.observed.clone()
    }
}
