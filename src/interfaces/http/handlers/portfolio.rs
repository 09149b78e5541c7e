//! `portfolio` endpoint group (§6.2): summary, cash breakdown, analytics.

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::application::bootstrap::Application;
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::CorrelationId;

#[derive(Serialize)]
pub struct PositionRow {
    security_id: String,
    quantity: Decimal,
    avg_cost: Decimal,
    market_value: Decimal,
}

#[derive(Serialize)]
pub struct PortfolioSummary {
    positions: Vec<PositionRow>,
    cash_by_currency: HashMap<String, Decimal>,
    total_equity: Decimal,
}

pub async fn summary(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    let positions = app.portfolio_repo.positions().await.map_err(|e| ApiError::new(e, &cid))?;
    let cash = app.broker.get_cash_balances().await.map_err(|e| ApiError::new(e, &cid))?;

    let cash_by_currency: HashMap<String, Decimal> =
        cash.into_iter().map(|b| (b.currency, b.amount)).collect();
    let mut total_equity = cash_by_currency.values().copied().sum::<Decimal>();
    let position_rows: Vec<PositionRow> = positions
        .into_iter()
        .map(|p| {
            total_equity += p.market_value;
            PositionRow {
                security_id: p.security_id,
                quantity: p.quantity,
                avg_cost: p.avg_cost,
                market_value: p.market_value,
            }
        })
        .collect();

    Ok(Json(PortfolioSummary {
        positions: position_rows,
        cash_by_currency,
        total_equity,
    }))
}

pub async fn cash_breakdown(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<HashMap<String, Decimal>>, ApiError> {
    let cash = app.broker.get_cash_balances().await.map_err(|e| ApiError::new(e, &cid))?;
    Ok(Json(cash.into_iter().map(|b| (b.currency, b.amount)).collect()))
}

#[derive(Serialize)]
pub struct PortfolioAnalytics {
    weights: HashMap<String, Decimal>,
    total_equity: Decimal,
    position_count: usize,
}

pub async fn analytics(
    State(app): State<Arc<Application>>,
    Extension(cid): Extension<CorrelationId>,
) -> Result<Json<PortfolioAnalytics>, ApiError> {
    let positions = app.portfolio_repo.positions().await.map_err(|e| ApiError::new(e, &cid))?;
    let cash = app.broker.get_cash_balances().await.map_err(|e| ApiError::new(e, &cid))?;

    let mut portfolio = crate::domain::trading::Portfolio::new();
    for position in &positions {
        portfolio.positions.insert(position.security_id.clone(), position.clone());
    }
    for balance in cash {
        portfolio.cash_by_currency.insert(balance.currency, balance.amount);
    }
    let prices: HashMap<String, Decimal> =
        positions.iter().map(|p| (p.security_id.clone(), p.avg_cost)).collect();
    let total_equity = portfolio.total_equity(&prices, &app.config.base_currency);
    let weights = portfolio.weights(&prices, &app.config.base_currency);

    Ok(Json(PortfolioAnalytics {
        position_count: portfolio.positions.len(),
        weights,
        total_equity,
    }))
}
