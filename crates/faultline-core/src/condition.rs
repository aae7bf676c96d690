//! Candidate repair conditions and their aggregation.
//!
//! A [`CandidateCondition`] pairs a boolean condition text with the model's
//! probability, carried as the literal string the model printed. Conditions
//! are collected into a [`ConditionSet`] per side of the repair predicate, and
//! the two sides travel together as a [`ConditionPair`].

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// CandidateCondition
// ============================================================================

/// A condition text with its model probability.
///
/// Equal iff both components are equal; the probability is never
/// renormalized or reformatted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateCondition {
    /// Final condition text, placeholder already substituted.
    pub condition: String,
    /// Probability exactly as produced by the model.
    pub probability: String,
}

impl CandidateCondition {
    pub fn new(condition: impl Into<String>, probability: impl Into<String>) -> Self {
        CandidateCondition {
            condition: condition.into(),
            probability: probability.into(),
        }
    }

    /// Probability parsed for ordering only; `None` if not a finite number.
    pub fn score(&self) -> Option<f64> {
        self.probability
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
    }
}

// ============================================================================
// ConditionSet
// ============================================================================

/// Deduplicated candidates for one side of a repair predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(BTreeSet<CandidateCondition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate; returns `false` if an equal one was already present.
    pub fn insert(&mut self, candidate: CandidateCondition) -> bool {
        self.0.insert(candidate)
    }

    pub fn contains(&self, candidate: &CandidateCondition) -> bool {
        self.0.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateCondition> {
        self.0.iter()
    }

    /// Absorb every candidate from `other`.
    pub fn extend(&mut self, other: ConditionSet) {
        self.0.extend(other.0);
    }

    /// Candidates by descending probability.
    ///
    /// Unparseable probabilities sort after every numeric one; ties break on
    /// condition text.
    pub fn ranked(&self) -> Vec<&CandidateCondition> {
        let mut ranked: Vec<&CandidateCondition> = self.0.iter().collect();
        ranked.sort_by(|a, b| compare_scores(a.score(), b.score()).then_with(|| a.cmp(b)));
        ranked
    }
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl FromIterator<CandidateCondition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = CandidateCondition>>(iter: I) -> Self {
        ConditionSet(iter.into_iter().collect())
    }
}

impl IntoIterator for ConditionSet {
    type Item = CandidateCondition;
    type IntoIter = std::collections::btree_set::IntoIter<CandidateCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a CandidateCondition;
    type IntoIter = std::collections::btree_set::Iter<'a, CandidateCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// ConditionPair
// ============================================================================

/// Left-variable and right-variable condition sets from one predict call.
///
/// Only the right side is populated today; the left side is kept so the
/// pair-shaped contract with patch generation stays stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionPair {
    pub left: ConditionSet,
    pub right: ConditionSet,
}

impl ConditionPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Accumulate another call's results into this pair.
    pub fn merge(&mut self, other: ConditionPair) {
        self.left.extend(other.left);
        self.right.extend(other.right);
    }
}
