//! Types produced and consumed by the planning pipeline (§4.4): candidates
//! from the opportunity identifier, sequences from the generator/evaluator,
//! and the final stored plan. The pipeline's logic lives in
//! `application::planning`; this module only holds the data it passes
//! between stages.

pub mod candidate;
pub mod plan;
pub mod scoring;
pub mod sequence;

pub use candidate::{CandidateKind, OpportunityCandidate};
pub use plan::{Plan, PlanStep};
pub use scoring::{ScoreBreakdown, ScoringWeights};
pub use sequence::{ActionStep, Sequence, SequencePattern};
