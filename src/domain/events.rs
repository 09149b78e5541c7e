use serde::{Deserialize, Serialize};

/// Process-wide event kinds published on the event bus (§4.7). Delivery is
/// best-effort: a slow subscriber is dropped with a log, never blocking the
/// publisher. Stores remain the state of record; nothing here is durable on
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PortfolioChanged { portfolio_hash: String },
    PlanRequested { portfolio_hash: String },
    RecommendationsReady { portfolio_hash: String },
    TradeExecuted { trade_id: String },
    JobCompleted { job_name: String, outcome: String },
    JobFailed { job_name: String, error_kind: String },
    ReconcileAlert { kind: String, detail: String },
    CircuitOpen { trigger: String },
    CircuitClosed,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PortfolioChanged { .. } => "portfolio_changed",
            Event::PlanRequested { .. } => "plan_requested",
            Event::RecommendationsReady { .. } => "recommendations_ready",
            Event::TradeExecuted { .. } => "trade_executed",
            Event::JobCompleted { .. } => "job_completed",
            Event::JobFailed { .. } => "job_failed",
            Event::ReconcileAlert { .. } => "reconcile_alert",
            Event::CircuitOpen { .. } => "circuit_open",
            Event::CircuitClosed => "circuit_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_wire_name() {
        let ev = Event::RecommendationsReady {
            portfolio_hash: "abc".into(),
        };
        assert_eq!(ev.kind(), "recommendations_ready");
    }
}
