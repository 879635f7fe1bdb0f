//! Property-based tests for the consensus solver
//!
//! 1. Consensus values never leave their bounds
//! 2. Clamped variables end at their clamp value
//! 3. Solves are reproducible

use hinge_admm::*;
use hinge_model::{atom, AtomKind, GroundKernel, LinearForm, MemoryStore};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// A chain of implications `V(i) → V(i+1)` with random weights, plus the
/// initial values of every variable.
fn chain_strategy() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (2usize..6).prop_flat_map(|n| {
        (
            prop::collection::vec(0.0f64..=1.0, n),
            prop::collection::vec(0.1f64..5.0, n - 1),
        )
    })
}

fn build(values: &[f64], weights: &[f64]) -> (MemoryStore, Vec<GroundKernel>) {
    let store = MemoryStore::new();
    store.register_predicate("V", 1);
    for (i, v) in values.iter().enumerate() {
        store
            .insert(atom!("V", i as i64), AtomKind::RandomVariable, *v)
            .unwrap();
    }
    let kernels = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            GroundKernel::compatibility(
                "chain",
                *w,
                LinearForm::new()
                    .term(atom!("V", i as i64), 1.0)
                    .term(atom!("V", i as i64 + 1), -1.0),
            )
        })
        .collect();
    (store, kernels)
}

// ============================================================================
// Solver Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn consensus_stays_in_unit_interval((values, weights) in chain_strategy()) {
        let (store, kernels) = build(&values, &weights);
        let mut solver = AdmmReasonerFactory::default().create().unwrap();
        for k in kernels {
            solver.add_ground_kernel(k, &store).unwrap();
        }
        solver.optimize();
        for z in solver.consensus() {
            prop_assert!((0.0..=1.0).contains(z));
        }
    }

    #[test]
    fn clamped_variable_holds_its_value(
        (values, weights) in chain_strategy(),
        clamp in 0.0f64..=1.0,
    ) {
        let (store, kernels) = build(&values, &weights);
        let mut solver = AdmmReasoner::new(AdmmConfig {
            epsilon_abs: 1e-8,
            epsilon_rel: 1e-6,
            ..AdmmConfig::default()
        })
        .unwrap();
        for k in kernels {
            solver.add_ground_kernel(k, &store).unwrap();
        }
        solver
            .add_ground_kernel(GroundKernel::value_constraint(atom!("V", 0i64), clamp), &store)
            .unwrap();
        solver.optimize();
        let v0 = solver.consensus_value(&atom!("V", 0i64)).unwrap();
        prop_assert!((v0 - clamp).abs() < 1e-3);
        prop_assert!(solver.infeasibility_norm() < 1e-3);
    }

    #[test]
    fn solves_are_reproducible((values, weights) in chain_strategy()) {
        let (store, kernels) = build(&values, &weights);
        let run = || {
            let mut solver = AdmmReasonerFactory::default().create().unwrap();
            for k in kernels.clone() {
                solver.add_ground_kernel(k, &store).unwrap();
            }
            let outcome = solver.optimize();
            (outcome.iterations, solver.consensus().to_vec())
        };
        prop_assert_eq!(run(), run());
    }
}
