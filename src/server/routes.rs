use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::application::{AppError, ExpenseFilter, LedgerService};
use crate::domain::{Cents, NewExpense, ParticipantId, Shares, Split};

/// Body of `POST /expenses`. Exactly one of `splits` or `participants` is given;
/// `participants` means an equal split in the listed order.
#[derive(Debug, Deserialize)]
pub struct CreateExpense {
    pub description: String,
    pub amount: Cents,
    pub payer: ParticipantId,
    pub splits: Option<Vec<Split>>,
    pub participants: Option<Vec<ParticipantId>>,
}

impl CreateExpense {
    fn into_command(self) -> Result<NewExpense, AppError> {
        let shares = match (self.splits, self.participants) {
            (Some(splits), None) => Shares::Exact(splits),
            (None, Some(participants)) => Shares::Equal(participants),
            _ => {
                return Err(AppError::InvalidRequest(
                    "provide exactly one of `splits` or `participants`".to_string(),
                ));
            }
        };
        Ok(NewExpense {
            description: self.description,
            amount: self.amount,
            payer: self.payer,
            shares,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePayment {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub amount: Cents,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    pub participant: Option<String>,
    pub limit: Option<usize>,
}

pub async fn health_handler(State(service): State<LedgerService>) -> impl IntoResponse {
    (StatusCode::OK, Json(service.health()))
}

pub async fn ready_handler(State(service): State<LedgerService>) -> Result<impl IntoResponse, AppError> {
    service.ready().await?;
    Ok((StatusCode::OK, Json(json!({ "status": "ready" }))))
}

pub async fn greeting_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Hello from the Splitwise ledger",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_expense_handler(
    State(service): State<LedgerService>,
    Json(payload): Json<CreateExpense>,
) -> Result<impl IntoResponse, AppError> {
    let expense = service.add_expense(payload.into_command()?).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn list_expenses_handler(
    State(service): State<LedgerService>,
    Query(query): Query<ExpenseQuery>,
) -> Result<impl IntoResponse, AppError> {
    let expenses = service
        .list_expenses_filtered(ExpenseFilter {
            participant: query.participant,
            limit: query.limit,
        })
        .await?;
    Ok(Json(expenses))
}

pub async fn get_expense_handler(
    State(service): State<LedgerService>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get_expense(id).await?))
}

pub async fn balances_handler(State(service): State<LedgerService>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get_balances().await?))
}

pub async fn settlements_handler(
    State(service): State<LedgerService>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.settlement_plan().await?))
}

pub async fn create_payment_handler(
    State(service): State<LedgerService>,
    Json(payload): Json<CreatePayment>,
) -> Result<impl IntoResponse, AppError> {
    let expense = service
        .record_payment(payload.from, payload.to, payload.amount, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}
