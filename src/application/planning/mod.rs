//! The planning pipeline (§4.4): optimizer -> opportunity identifier ->
//! eligibility/cooldown/correlation/diversity filters -> sequence generator
//! -> sequence evaluator -> plan builder. Each stage is runnable on its own
//! as an individually queueable job; `planner_batch` in
//! `application::jobs` chains them.

pub mod filters;
pub mod opportunity_identifier;
pub mod optimizer;
pub mod plan_builder;
pub mod sequence_evaluator;
pub mod sequence_generator;

pub use filters::{apply_eligibility_filters, filter_correlation_aware, filter_diversity_top_k, EligibilityInput};
pub use opportunity_identifier::{identify_opportunities, OpportunityIdentifierInput, SecuritySignal};
pub use optimizer::{optimize, OptimizerInput, OptimizerOutput};
pub use plan_builder::{build_plan, NoFeasiblePlan, RECOMMENDATION_TTL};
pub use sequence_evaluator::{evaluate_sequences, EvaluatedSequence, EvaluatorInput, SecurityMeta};
pub use sequence_generator::{generate_sequences, GenerationContext};
