//! The online round controller.
//!
//! A round walks `Seed → Score → Select → ConstraintClosure → Clamp → Solve →
//! Commit → Done`. The first round has no history to score, so it grounds the
//! whole program and goes straight from `Seed` to `Solve`. Every round builds
//! a fresh solver; only the [`ReasonerSnapshot`] it leaves behind carries over.

use crate::activation::Activator;
use crate::clamp::plan_clamps;
use crate::config::{OnlineConfig, StructureSource};
use crate::error::{OnlineError, Result};
use crate::scoring::{ActivationScorer, ScoreMap, ScoringFallback};
use crate::selection::{self, activation_quota, QuotaDiagnostic};
use crate::snapshot::ReasonerSnapshot;
use hinge_admm::{AdmmReasonerFactory, ConsensusSolver, ConsensusView, SolverFactory};
use hinge_model::{Atom, AtomLookup, AtomRecord, AtomRef, AtomStore, GroundingSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Seed,
    Score,
    Select,
    ConstraintClosure,
    Clamp,
    Solve,
    Commit,
    Done,
}

impl RoundPhase {
    /// Move forward to `next`. Phases never repeat within a round.
    fn advance(&mut self, next: RoundPhase) {
        debug_assert!(next > *self, "round phase went from {self} back to {next}");
        tracing::debug!(from = %self, to = %next, "round phase");
        *self = next;
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Seed => "seed",
            RoundPhase::Score => "score",
            RoundPhase::Select => "select",
            RoundPhase::ConstraintClosure => "constraint_closure",
            RoundPhase::Clamp => "clamp",
            RoundPhase::Solve => "solve",
            RoundPhase::Commit => "commit",
            RoundPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Report of one round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundResult {
    /// Zero for the initial full solve.
    pub round: usize,
    pub first_round: bool,
    pub total_weighted_incompatibility: f64,
    pub infeasibility_norm: f64,
    /// Random variables whose values were written back.
    pub committed_count: usize,
    /// Kernels in the solve, clamps included.
    pub problem_size: usize,
    /// Random-variable activations, constraint partners included.
    pub activated_count: usize,
    pub clamped_count: usize,
    pub quota: Option<usize>,
    pub converged: bool,
    pub iterations: usize,
    pub sampling_shortfall: Option<usize>,
    pub quota_diagnostic: Option<QuotaDiagnostic>,
    pub scoring_fallback: Option<ScoringFallback>,
    /// Every active atom in activation order, observed seeds included.
    pub activated: Vec<Atom>,
    pub clamped: Vec<Atom>,
    #[serde(skip)]
    pub next_snapshot: Arc<ReasonerSnapshot>,
}

// ============================================================================
// Controller
// ============================================================================

/// Runs successive inference rounds against one store and grounding program.
pub struct OnlineInference<S, G, F = AdmmReasonerFactory>
where
    S: AtomStore,
    G: GroundingSource,
    F: SolverFactory,
{
    store: Arc<S>,
    grounding: Arc<G>,
    factory: F,
    config: OnlineConfig,
    scorer: ActivationScorer,
    scoring_fallback: Option<ScoringFallback>,
    previous: Option<Arc<ReasonerSnapshot>>,
    initial: Option<Arc<ReasonerSnapshot>>,
    rng: StdRng,
    rounds: usize,
}

impl<S, G> OnlineInference<S, G, AdmmReasonerFactory>
where
    S: AtomStore,
    G: GroundingSource,
{
    /// Controller backed by the ADMM reasoner configured in `config.solver`.
    pub fn with_admm(store: Arc<S>, grounding: Arc<G>, config: OnlineConfig) -> Result<Self> {
        let factory = AdmmReasonerFactory::new(config.solver.clone());
        Self::new(store, grounding, factory, config)
    }
}

impl<S, G, F> OnlineInference<S, G, F>
where
    S: AtomStore,
    G: GroundingSource,
    F: SolverFactory,
{
    pub fn new(store: Arc<S>, grounding: Arc<G>, factory: F, config: OnlineConfig) -> Result<Self> {
        config.validate()?;
        let (scorer, scoring_fallback) = ActivationScorer::from_config(&config.scoring);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            store,
            grounding,
            factory,
            config,
            scorer,
            scoring_fallback,
            previous: None,
            initial: None,
            rng,
            rounds: 0,
        })
    }

    pub fn config(&self) -> &OnlineConfig {
        &self.config
    }

    /// Snapshot of the most recent round.
    pub fn snapshot(&self) -> Option<&Arc<ReasonerSnapshot>> {
        self.previous.as_ref()
    }

    /// Snapshot of the first full solve.
    pub fn initial_snapshot(&self) -> Option<&Arc<ReasonerSnapshot>> {
        self.initial.as_ref()
    }

    pub fn rounds_completed(&self) -> usize {
        self.rounds
    }

    /// Activation scores over the latest snapshot; `None` before the first
    /// round. Draws from the controller's RNG for the `random` strategy.
    pub fn scores(&mut self) -> Option<ScoreMap> {
        let previous = self.previous.clone()?;
        Some(self.scorer.score(&previous, &mut self.rng))
    }

    /// Run one round seeded with `seeds`.
    pub fn run_round(&mut self, seeds: &[AtomRef]) -> Result<RoundResult> {
        let mut phase = RoundPhase::Seed;
        let records = self.resolve_seeds(seeds)?;

        let result = match self.previous.clone() {
            None => self.full_round(&mut phase)?,
            Some(previous) => self.incremental_round(&mut phase, &records, previous)?,
        };
        phase.advance(RoundPhase::Done);

        self.previous = Some(Arc::clone(&result.next_snapshot));
        if self.initial.is_none() {
            self.initial = Some(Arc::clone(&result.next_snapshot));
        }
        self.rounds += 1;

        tracing::info!(
            round = result.round,
            first_round = result.first_round,
            activated = result.activated_count,
            clamped = result.clamped_count,
            committed = result.committed_count,
            size = result.problem_size,
            converged = result.converged,
            iterations = result.iterations,
            incompatibility = result.total_weighted_incompatibility,
            infeasibility = result.infeasibility_norm,
            "round complete"
        );
        Ok(result)
    }

    fn resolve_seeds(&self, seeds: &[AtomRef]) -> Result<Vec<AtomRecord>> {
        seeds
            .iter()
            .map(|seed| {
                self.store
                    .resolve(&seed.predicate, &seed.args)
                    .map_err(|source| OnlineError::SeedResolution {
                        atom: seed.to_string(),
                        source,
                    })
            })
            .collect()
    }

    /// Ground everything, solve, commit every variable.
    fn full_round(&mut self, phase: &mut RoundPhase) -> Result<RoundResult> {
        let lookup: &dyn AtomLookup = &*self.store;
        let mut solver = self.factory.create()?;
        for kernel in self.grounding.ground_all() {
            solver.add_ground_kernel(kernel, lookup)?;
        }
        tracing::info!(
            kernels = solver.size(),
            variables = solver.variables().len(),
            "grounded full program"
        );

        phase.advance(RoundPhase::Solve);
        let outcome = solver.optimize();

        phase.advance(RoundPhase::Commit);
        let mut committed = 0;
        for (atom, &value) in solver.variables().iter().zip(solver.consensus()) {
            self.store.persist_value(atom, value)?;
            committed += 1;
        }
        let activated = solver.variables().to_vec();

        Ok(RoundResult {
            round: self.rounds,
            first_round: true,
            total_weighted_incompatibility: solver.total_weighted_incompatibility(),
            infeasibility_norm: solver.infeasibility_norm(),
            committed_count: committed,
            problem_size: solver.size(),
            activated_count: activated.len(),
            clamped_count: 0,
            quota: None,
            converged: outcome.converged,
            iterations: outcome.iterations,
            sampling_shortfall: None,
            quota_diagnostic: None,
            scoring_fallback: self.scoring_fallback.clone(),
            activated,
            clamped: Vec::new(),
            next_snapshot: Arc::new(ReasonerSnapshot::from_view(&solver)),
        })
    }

    fn incremental_round(
        &mut self,
        phase: &mut RoundPhase,
        records: &[AtomRecord],
        previous: Arc<ReasonerSnapshot>,
    ) -> Result<RoundResult> {
        let structure = match self.config.structure_source {
            StructureSource::Latest => Arc::clone(&previous),
            StructureSource::Initial => self
                .initial
                .clone()
                .unwrap_or_else(|| Arc::clone(&previous)),
        };
        let lookup: &dyn AtomLookup = &*self.store;

        let mut activator = Activator::new(lookup, &structure, self.config.max_activations);
        for record in records {
            activator.seed(record);
        }
        tracing::debug!(
            seeds = records.len(),
            activated = activator.activated_count(),
            "seeded round"
        );

        phase.advance(RoundPhase::Score);
        let scores = self.scorer.score(&previous, &mut self.rng);

        phase.advance(RoundPhase::Select);
        let decision = activation_quota(
            self.config.activation_quota,
            self.config.activation_percent,
            scores.len(),
        );
        let shortfall = selection::select(
            self.config.selection,
            &mut activator,
            &scores,
            &structure,
            decision.quota,
            &mut self.rng,
        );
        tracing::debug!(
            quota = decision.quota,
            activated = activator.activated_count(),
            policy = ?self.config.selection,
            "selection finished"
        );

        phase.advance(RoundPhase::ConstraintClosure);
        let mut solver = self.factory.create()?;
        let grounded = activator.ground_pending(&*self.grounding, &previous, |kernel| {
            solver.add_ground_kernel(kernel, lookup).map(|_| ())
        })?;
        let active = activator.into_set();
        tracing::debug!(kernels = grounded, active = active.len(), "grounded activated atoms");

        phase.advance(RoundPhase::Clamp);
        let clamps = plan_clamps(&previous, &active, lookup);
        for clamp in &clamps {
            solver.add_ground_kernel(clamp.kernel(), lookup)?;
        }
        tracing::info!(clamped = clamps.len(), "clamped variables to consensus estimates");

        phase.advance(RoundPhase::Solve);
        let outcome = solver.optimize();

        phase.advance(RoundPhase::Commit);
        let mut committed = 0;
        for atom in active.in_order() {
            let is_rv = lookup
                .lookup(atom)
                .map(|r| r.is_random_variable())
                .unwrap_or(false);
            if !is_rv {
                continue;
            }
            if let Some(value) = solver.consensus_value(atom) {
                tracing::trace!(atom = %atom, value, "committing");
                self.store.persist_value(atom, value)?;
                committed += 1;
            }
        }

        Ok(RoundResult {
            round: self.rounds,
            first_round: false,
            total_weighted_incompatibility: solver.total_weighted_incompatibility(),
            infeasibility_norm: solver.infeasibility_norm(),
            committed_count: committed,
            problem_size: solver.size(),
            activated_count: active.random_variable_count(),
            clamped_count: clamps.len(),
            quota: Some(decision.quota),
            converged: outcome.converged,
            iterations: outcome.iterations,
            sampling_shortfall: shortfall,
            quota_diagnostic: decision.diagnostic,
            scoring_fallback: self.scoring_fallback.clone(),
            activated: active.in_order().to_vec(),
            clamped: clamps.into_iter().map(|c| c.atom).collect(),
            next_snapshot: Arc::new(ReasonerSnapshot::from_view(&solver)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use hinge_admm::AdmmConfig;
    use hinge_model::{atom, AtomKind, Comparator, GroundKernel, GroundProgram, LinearForm, MemoryStore};

    fn votes(name: &str) -> Atom {
        atom!("Votes", name)
    }

    /// alice → bob → carol by friendship, carol and dave share a budget.
    fn fixture() -> (Arc<MemoryStore>, Arc<GroundProgram>) {
        let store = MemoryStore::new();
        store.register_predicate("Votes", 1);
        store.register_predicate("Friends", 2);
        store.register_predicate("Anchor", 1);
        for name in ["alice", "bob", "carol", "dave"] {
            store.insert(votes(name), AtomKind::RandomVariable, 0.5).unwrap();
        }
        store
            .insert(atom!("Friends", "alice", "bob"), AtomKind::Observed, 1.0)
            .unwrap();
        store
            .insert(atom!("Friends", "bob", "carol"), AtomKind::Observed, 1.0)
            .unwrap();
        store
            .insert(atom!("Anchor", "alice"), AtomKind::Observed, 0.9)
            .unwrap();

        let mut program = GroundProgram::new();
        program.add(GroundKernel::compatibility(
            "anchor",
            5.0,
            LinearForm::new()
                .term(atom!("Anchor", "alice"), 1.0)
                .term(votes("alice"), -1.0),
        ));
        for (a, b, w) in [("alice", "bob", 2.0), ("bob", "carol", 1.0)] {
            program.add(GroundKernel::compatibility(
                "friends",
                w,
                LinearForm::new()
                    .term(atom!("Friends", a, b), 1.0)
                    .term(votes(a), 1.0)
                    .term(votes(b), -1.0)
                    .constant(-1.0),
            ));
        }
        for name in ["alice", "bob", "carol", "dave"] {
            program.add(GroundKernel::squared_compatibility(
                "prior",
                0.1,
                LinearForm::new().term(votes(name), 1.0),
            ));
        }
        program.add(GroundKernel::constraint(
            "budget",
            Comparator::LessEqual,
            LinearForm::new()
                .term(votes("carol"), 1.0)
                .term(votes("dave"), 1.0)
                .constant(-1.0),
        ));
        (Arc::new(store), Arc::new(program))
    }

    fn config(quota: usize) -> OnlineConfig {
        OnlineConfig {
            scoring: ScoringConfig {
                method: "truthvalue".to_string(),
                ..ScoringConfig::default()
            },
            activation_quota: Some(quota),
            seed: Some(7),
            ..OnlineConfig::default()
        }
    }

    #[test]
    fn test_first_round_solves_everything() {
        let (store, program) = fixture();
        let mut online = OnlineInference::with_admm(store.clone(), program, config(1)).unwrap();
        assert!(online.scores().is_none());

        let result = online.run_round(&[]).unwrap();
        assert!(result.first_round);
        assert_eq!(result.round, 0);
        assert_eq!(result.committed_count, 4);
        assert_eq!(result.problem_size, 8);
        assert!(result.infeasibility_norm < 1e-2);
        assert_eq!(online.snapshot().unwrap().len(), 4);
        assert!(online.initial_snapshot().is_some());
        assert!(store.value_of(&votes("alice")).unwrap() > 0.5);
    }

    #[test]
    fn test_seed_pulls_constraint_partner_and_clamps_rest() {
        let (store, program) = fixture();
        let mut online = OnlineInference::with_admm(store.clone(), program, config(1)).unwrap();
        online.run_round(&[]).unwrap();
        let before = online.snapshot().unwrap().clone();

        let result = online.run_round(&[votes("carol").to_ref()]).unwrap();
        assert!(!result.first_round);
        assert_eq!(result.round, 1);
        assert_eq!(result.quota, Some(1));
        assert_eq!(result.activated, vec![votes("carol"), votes("dave")]);
        assert_eq!(result.activated_count, 2);
        assert_eq!(result.clamped, vec![votes("alice"), votes("bob")]);
        assert_eq!(result.committed_count, 2);
        assert!(result.infeasibility_norm < 1e-2);

        // Clamped atoms keep their committed value.
        let alice = before.variable(&votes("alice")).unwrap().consensus;
        assert_eq!(store.value_of(&votes("alice")), Some(alice));
        assert_eq!(online.rounds_completed(), 2);
    }

    #[test]
    fn test_observed_seed_does_not_use_quota() {
        let (store, program) = fixture();
        let mut online = OnlineInference::with_admm(store, program, config(1)).unwrap();
        online.run_round(&[]).unwrap();

        let result = online
            .run_round(&[atom!("Anchor", "alice").to_ref()])
            .unwrap();
        assert_eq!(result.activated[0], atom!("Anchor", "alice"));
        assert!(result.activated_count >= 1);
        // Every prior variable is either re-solved or clamped.
        assert_eq!(result.activated_count + result.clamped_count, 4);
    }

    #[test]
    fn test_unconverged_round_still_commits() {
        let (store, program) = fixture();
        let mut cfg = config(1);
        cfg.solver = AdmmConfig {
            max_iterations: 1,
            epsilon_abs: 0.0,
            epsilon_rel: 0.0,
            ..AdmmConfig::default()
        };
        let mut online = OnlineInference::with_admm(store.clone(), program, cfg).unwrap();
        let first = online.run_round(&[]).unwrap();
        assert!(!first.converged);
        assert_eq!(first.committed_count, 4);

        // With the anchor gone every kernel on alice pulls her down.
        store.update_value(&atom!("Anchor", "alice"), 0.0).unwrap();
        let before = store.value_of(&votes("alice")).unwrap();
        assert!(before > 0.0);

        let result = online.run_round(&[votes("alice").to_ref()]).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.activated, vec![votes("alice")]);
        assert_eq!(result.committed_count, 1);
        assert!(store.value_of(&votes("alice")).unwrap() < before);
        assert_eq!(online.rounds_completed(), 2);
    }

    #[test]
    fn test_unknown_seed_is_fatal() {
        let (store, program) = fixture();
        let mut online = OnlineInference::with_admm(store, program, config(1)).unwrap();
        online.run_round(&[]).unwrap();
        let err = online
            .run_round(&[AtomRef::new("Missing", vec!["x".into()])])
            .unwrap_err();
        assert!(matches!(err, OnlineError::SeedResolution { .. }));
        assert_eq!(online.rounds_completed(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (store, program) = fixture();
        let mut bad = config(1);
        bad.activation_percent = Some(2.0);
        assert!(matches!(
            OnlineInference::with_admm(store, program, bad),
            Err(OnlineError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_strategy_is_reported() {
        let (store, program) = fixture();
        let mut cfg = config(1);
        cfg.scoring.method = "mystery".to_string();
        let mut online = OnlineInference::with_admm(store, program, cfg).unwrap();
        let result = online.run_round(&[]).unwrap();
        assert!(matches!(result.scoring_fallback, Some(ScoringFallback::UnknownMethod(_))));
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(RoundPhase::Seed < RoundPhase::Score);
        assert!(RoundPhase::Clamp < RoundPhase::Solve);
        let mut phase = RoundPhase::Seed;
        phase.advance(RoundPhase::Solve);
        assert_eq!(phase, RoundPhase::Solve);
        assert_eq!(phase.to_string(), "solve");
    }
}
