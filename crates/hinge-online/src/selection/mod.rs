//! Selection policies: grow the activation set from a score map until the
//! quota of random-variable activations is reached.
//!
//! The quota counts every activation of the round, seeds included. Each
//! activation goes through [`Activator::activate_variable`], so constraint
//! partners are pulled in regardless of policy and the final count can exceed
//! the quota.

pub mod frontier;

use crate::activation::Activator;
use crate::config::SelectionPolicy;
use crate::scoring::ScoreMap;
use crate::snapshot::ReasonerSnapshot;
use hinge_model::Atom;
use rand::Rng;
use serde::Serialize;
use std::fmt;

pub use frontier::{decayed_priority, FrontierEntry, FrontierQueue, Offer};

/// Share of scorable variables activated when no quota is configured.
pub const DEFAULT_ACTIVATION_PERCENT: f64 = 0.25;

/// Draw attempts allowed per requested activation when sampling.
pub const SAMPLE_ATTEMPTS_PER_DRAW: usize = 10;

// ============================================================================
// Quota
// ============================================================================

/// Non-fatal notes about how the quota was derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDiagnostic {
    /// Both settings present; the fixed quota won.
    BothConfigured { quota: usize, percent: f64 },
    /// Neither present; the default percentage applied.
    NeitherConfigured,
}

impl fmt::Display for QuotaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaDiagnostic::BothConfigured { quota, percent } => write!(
                f,
                "both activation_quota ({quota}) and activation_percent ({percent}) set; using the fixed quota"
            ),
            QuotaDiagnostic::NeitherConfigured => write!(
                f,
                "no activation quota configured; activating {}% of scorable variables",
                DEFAULT_ACTIVATION_PERCENT * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaDecision {
    pub quota: usize,
    pub diagnostic: Option<QuotaDiagnostic>,
}

/// Derive this round's quota. Zero or negative settings count as unset.
pub fn activation_quota(fixed: Option<usize>, percent: Option<f64>, scorable: usize) -> QuotaDecision {
    let fixed = fixed.filter(|&q| q > 0);
    let percent = percent.filter(|&p| p > 0.0);
    let of_scorable = |p: f64| (p * scorable as f64).floor() as usize;

    let (quota, diagnostic) = match (fixed, percent) {
        (Some(quota), Some(percent)) => (quota, Some(QuotaDiagnostic::BothConfigured { quota, percent })),
        (Some(quota), None) => (quota, None),
        (None, Some(percent)) => (of_scorable(percent), None),
        (None, None) => (
            of_scorable(DEFAULT_ACTIVATION_PERCENT),
            Some(QuotaDiagnostic::NeitherConfigured),
        ),
    };
    if let Some(d) = &diagnostic {
        tracing::warn!(quota, scorable, "{d}");
    }
    QuotaDecision { quota, diagnostic }
}

// ============================================================================
// Top-K
// ============================================================================

/// Atoms by score descending, ties by atom ascending.
pub fn rank_descending(scores: &ScoreMap) -> Vec<(&Atom, f64)> {
    let mut ranked: Vec<(&Atom, f64)> = scores.iter().map(|(a, &s)| (a, s)).collect();
    ranked.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.cmp(b)));
    ranked
}

/// The `k` best-scored atoms.
pub fn top_k(scores: &ScoreMap, k: usize) -> Vec<Atom> {
    rank_descending(scores)
        .into_iter()
        .take(k)
        .map(|(a, _)| a.clone())
        .collect()
}

pub fn select_top_k(activator: &mut Activator<'_>, scores: &ScoreMap, quota: usize) {
    for (atom, score) in rank_descending(scores) {
        if activator.activated_count() >= quota {
            break;
        }
        activator.activate_variable(atom, score);
    }
}

// ============================================================================
// Weighted sampling
// ============================================================================

/// Candidates drawn with probability proportional to `|score|`, without
/// replacement.
#[derive(Debug, Clone)]
pub struct WeightedPool {
    candidates: Vec<(Atom, f64)>,
}

impl WeightedPool {
    pub fn new(scores: &ScoreMap) -> Self {
        Self {
            candidates: scores.iter().map(|(a, &s)| (a.clone(), s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn weight(score: f64) -> f64 {
        if score.is_finite() {
            score.abs()
        } else {
            0.0
        }
    }

    /// Remove and return one candidate with its score. The cumulative walk
    /// runs in atom order, so a fixed RNG state always yields the same atom.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(Atom, f64)> {
        if self.candidates.is_empty() {
            return None;
        }
        let total: f64 = self.candidates.iter().map(|(_, s)| Self::weight(*s)).sum();
        let selector = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = self.candidates.len() - 1;
        for (i, (_, s)) in self.candidates.iter().enumerate() {
            cumulative += Self::weight(*s);
            if cumulative >= selector {
                chosen = i;
                break;
            }
        }
        Some(self.candidates.remove(chosen))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    /// In draw order.
    pub drawn: Vec<Atom>,
    pub attempts: usize,
}

/// Draw `min(k, |scores|)` distinct atoms.
pub fn sample_without_replacement<R: Rng + ?Sized>(scores: &ScoreMap, k: usize, rng: &mut R) -> SampleOutcome {
    let mut pool = WeightedPool::new(scores);
    let mut drawn = Vec::with_capacity(k.min(pool.len()));
    let mut attempts = 0;
    while drawn.len() < k {
        let Some((atom, _)) = pool.draw(rng) else { break };
        attempts += 1;
        drawn.push(atom);
    }
    SampleOutcome { drawn, attempts }
}

/// Returns the shortfall when the attempt cap stops sampling short of the
/// quota. Draws that add nothing (already active, or not a random variable)
/// still use up an attempt.
pub fn select_sampled<R: Rng + ?Sized>(
    activator: &mut Activator<'_>,
    scores: &ScoreMap,
    quota: usize,
    rng: &mut R,
) -> Option<usize> {
    let mut pool = WeightedPool::new(scores);
    let limit = SAMPLE_ATTEMPTS_PER_DRAW * quota.min(pool.len());
    let mut attempts = 0;
    while activator.activated_count() < quota && attempts < limit {
        let Some((atom, score)) = pool.draw(rng) else { break };
        attempts += 1;
        activator.activate_variable(&atom, score);
    }

    let activated = activator.activated_count();
    if activated < quota && attempts >= limit && limit > 0 {
        let shortfall = quota - activated;
        tracing::warn!(
            attempts,
            activated,
            quota,
            shortfall,
            "sampling attempt limit reached before the quota"
        );
        return Some(shortfall);
    }
    None
}

// ============================================================================
// Relational exploration
// ============================================================================

/// Best-first walk outward from the current activation set through shared
/// kernels of `structure`, priority `score / 2^distance`.
pub fn select_relational(
    activator: &mut Activator<'_>,
    scores: &ScoreMap,
    structure: &ReasonerSnapshot,
    quota: usize,
) {
    let mut frontier = FrontierQueue::new();
    let start: Vec<Atom> = activator.activation_set().in_order().to_vec();
    for atom in &start {
        expand(&mut frontier, scores, structure, atom, 1);
    }

    while activator.activated_count() < quota {
        let Some(entry) = frontier.pop() else {
            tracing::debug!(
                activated = activator.activated_count(),
                quota,
                "relational frontier exhausted"
            );
            break;
        };
        tracing::trace!(
            atom = %entry.atom,
            score = entry.score,
            distance = entry.distance,
            priority = entry.priority,
            "popped frontier entry"
        );
        activator.activate_variable(&entry.atom, entry.score);
        expand(&mut frontier, scores, structure, &entry.atom, entry.distance + 1);
    }
}

fn expand(
    frontier: &mut FrontierQueue,
    scores: &ScoreMap,
    structure: &ReasonerSnapshot,
    from: &Atom,
    distance: u32,
) {
    for neighbor in structure.related_atoms(from) {
        match scores.get(&neighbor) {
            Some(&score) => {
                frontier.offer(&neighbor, score, distance);
            }
            None => tracing::trace!(atom = %neighbor, via = %from, "neighbor has no score; skipped"),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run `policy`. Returns the sampling shortfall, if any.
pub fn select<R: Rng + ?Sized>(
    policy: SelectionPolicy,
    activator: &mut Activator<'_>,
    scores: &ScoreMap,
    structure: &ReasonerSnapshot,
    quota: usize,
    rng: &mut R,
) -> Option<usize> {
    match policy {
        SelectionPolicy::TopK => {
            select_top_k(activator, scores, quota);
            None
        }
        SelectionPolicy::Sampled => select_sampled(activator, scores, quota, rng),
        SelectionPolicy::Relational => {
            select_relational(activator, scores, structure, quota);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticView;
    use hinge_model::{atom, AtomKind, Comparator, MemoryStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scores(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|(n, s)| (atom!("V", *n), *s)).collect()
    }

    fn store(names: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        store.register_predicate("V", 1);
        for n in names {
            store.insert(atom!("V", *n), AtomKind::RandomVariable, 0.5).unwrap();
        }
        store
    }

    /// Chain a - b - c - d of soft kernels, plus e isolated.
    fn chain() -> ReasonerSnapshot {
        let mut v = StaticView::new();
        for n in ["a", "b", "c", "d", "e"] {
            v.variable(atom!("V", n), 0.5);
        }
        for (x, y) in [("a", "b"), ("b", "c"), ("c", "d")] {
            v.compatibility(1.0, &[(atom!("V", x), 1.0), (atom!("V", y), -1.0)], &[0.0, 0.0]);
        }
        ReasonerSnapshot::from_view(&v)
    }

    #[test]
    fn test_quota_derivation() {
        assert_eq!(activation_quota(Some(3), None, 100).quota, 3);
        assert_eq!(activation_quota(None, Some(0.1), 25).quota, 2);

        let both = activation_quota(Some(3), Some(0.5), 100);
        assert_eq!(both.quota, 3);
        assert!(matches!(both.diagnostic, Some(QuotaDiagnostic::BothConfigured { quota: 3, .. })));

        let neither = activation_quota(Some(0), None, 4);
        assert_eq!(neither.quota, 1);
        assert_eq!(neither.diagnostic, Some(QuotaDiagnostic::NeitherConfigured));
    }

    #[test]
    fn test_top_k_order_and_ties() {
        let s = scores(&[("d", 0.1), ("c", 0.5), ("b", 0.7), ("a", 0.9), ("e", 0.7)]);
        assert_eq!(top_k(&s, 3), vec![atom!("V", "a"), atom!("V", "b"), atom!("V", "e")]);
        assert_eq!(top_k(&s, 10).len(), 5);
    }

    #[test]
    fn test_select_top_k_counts_seeds() {
        let st = store(&["a", "b", "c", "d"]);
        let snap = chain();
        let mut act = Activator::new(&st, &snap, None);
        act.activate_variable(&atom!("V", "d"), 0.0);
        select_top_k(&mut act, &scores(&[("a", 0.9), ("b", 0.7), ("c", 0.5)]), 2);
        assert_eq!(act.activated_count(), 2);
        assert!(act.activation_set().contains(&atom!("V", "a")));
        assert!(!act.activation_set().contains(&atom!("V", "b")));
    }

    #[test]
    fn test_closure_overshoots_quota() {
        let st = store(&["a", "b"]);
        let mut v = StaticView::new();
        v.variable(atom!("V", "a"), 0.5);
        v.variable(atom!("V", "b"), 0.5);
        v.constraint(
            Comparator::LessEqual,
            &[(atom!("V", "a"), 1.0), (atom!("V", "b"), 1.0)],
            &[0.0, 0.0],
        );
        let snap = ReasonerSnapshot::from_view(&v);
        let mut act = Activator::new(&st, &snap, None);
        select_top_k(&mut act, &scores(&[("a", 0.9), ("b", 0.1)]), 1);
        assert_eq!(act.activated_count(), 2);
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let s = scores(&[("a", 0.9), ("b", 0.7), ("c", 0.5), ("d", 0.1)]);
        let first = sample_without_replacement(&s, 3, &mut StdRng::seed_from_u64(11));
        let again = sample_without_replacement(&s, 3, &mut StdRng::seed_from_u64(11));
        assert_eq!(first, again);
        assert_eq!(first.drawn.len(), 3);
        let mut distinct = first.drawn.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_sampling_skips_zero_weight_until_exhausted() {
        let s = scores(&[("a", 0.0), ("b", 5.0), ("c", 0.0)]);
        let out = sample_without_replacement(&s, 1, &mut StdRng::seed_from_u64(3));
        assert_eq!(out.drawn, vec![atom!("V", "b")]);
        let all = sample_without_replacement(&s, 5, &mut StdRng::seed_from_u64(3));
        assert_eq!(all.drawn.len(), 3);
    }

    fn observed_store(n: usize) -> (MemoryStore, ScoreMap) {
        let st = MemoryStore::new();
        st.register_predicate("V", 1);
        let mut s = ScoreMap::new();
        for i in 0..n {
            let a = atom!("V", i as i64);
            st.insert(a.clone(), AtomKind::Observed, 0.5).unwrap();
            s.insert(a, 1.0);
        }
        (st, s)
    }

    #[test]
    fn test_sampling_exhaustion_is_not_a_shortfall() {
        // No draw can activate an observed atom; the pool empties first.
        let (st, s) = observed_store(3);
        let snap = ReasonerSnapshot::default();
        let mut act = Activator::new(&st, &snap, None);
        let shortfall = select_sampled(&mut act, &s, 2, &mut StdRng::seed_from_u64(1));
        assert_eq!(shortfall, None);
        assert_eq!(act.activated_count(), 0);
    }

    #[test]
    fn test_sampling_reports_shortfall() {
        let (st, s) = observed_store(30);
        let snap = ReasonerSnapshot::default();
        let mut act = Activator::new(&st, &snap, None);
        let shortfall = select_sampled(&mut act, &s, 1, &mut StdRng::seed_from_u64(1));
        assert_eq!(shortfall, Some(1));
    }

    #[test]
    fn test_sampled_selection_meets_quota() {
        let st = store(&["a", "b", "c", "d"]);
        let snap = chain();
        let mut act = Activator::new(&st, &snap, None);
        let s = scores(&[("a", 0.9), ("b", 0.7), ("c", 0.5), ("d", 0.1)]);
        let shortfall = select_sampled(&mut act, &s, 2, &mut StdRng::seed_from_u64(42));
        assert_eq!(shortfall, None);
        assert_eq!(act.activated_count(), 2);
    }

    #[test]
    fn test_relational_walks_outward() {
        let st = store(&["a", "b", "c", "d", "e"]);
        let snap = chain();
        let mut act = Activator::new(&st, &snap, None);
        act.activate_variable(&atom!("V", "a"), 0.0);
        // e scores highest but is unreachable from a.
        let s = scores(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0), ("e", 100.0)]);
        select_relational(&mut act, &s, &snap, 3);
        let active: Vec<&Atom> = act.activation_set().in_order().iter().collect();
        assert_eq!(active, vec![&atom!("V", "a"), &atom!("V", "b"), &atom!("V", "c")]);
    }

    #[test]
    fn test_relational_prefers_close_over_far() {
        let st = store(&["a", "b", "c", "d", "e"]);
        let snap = chain();
        let mut act = Activator::new(&st, &snap, None);
        act.activate_variable(&atom!("V", "b"), 0.0);
        // a and c are one hop from b; c scores higher.
        let s = scores(&[("a", 1.0), ("c", 3.0), ("d", 5.0)]);
        select_relational(&mut act, &s, &snap, 2);
        assert!(act.activation_set().contains(&atom!("V", "c")));
        assert!(!act.activation_set().contains(&atom!("V", "a")));
    }
}
