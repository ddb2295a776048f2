use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::TargetType;
use crate::models::withdrawal::{WithdrawalRequest, WithdrawalStatus};
use crate::notify::NotificationSink;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalDecision {
    pub request: WithdrawalRequest,
    pub remaining_balance: Decimal,
}

/// Records a payout request. The wallet is only debited on approval, so the
/// balance check here is advisory and repeated at approval time.
pub fn request_withdrawal(
    state: &AppState,
    rider_id: Uuid,
    amount: Decimal,
    bank_account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(format!(
            "withdrawal amount {amount} must be positive"
        )));
    }

    let request = {
        let rider = state
            .riders
            .get(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

        let available = rider.wallet.balance();
        if amount > available {
            return Err(AppError::InsufficientFunds {
                requested: amount,
                available,
            });
        }

        let bank_detail = rider
            .bank_accounts
            .iter()
            .find(|account| account.id == bank_account_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "bank account {bank_account_id} not found for rider {rider_id}"
                ))
            })?;

        WithdrawalRequest {
            id: Uuid::new_v4(),
            rider_id,
            amount,
            bank_detail,
            status: WithdrawalStatus::Requested,
            created_at: now,
            updated_at: now,
        }
    };

    state.withdrawals.insert(request.id, request.clone());
    info!(
        withdrawal_id = %request.id,
        rider_id = %rider_id,
        amount = %amount,
        "withdrawal requested"
    );

    Ok(request)
}

/// Debits the wallet and marks the request approved. The withdrawal entry
/// stays locked for the whole operation so a second approval sees
/// `Approved` and fails instead of debiting twice.
pub fn approve_withdrawal(
    state: &AppState,
    withdrawal_id: Uuid,
    now: DateTime<Utc>,
) -> Result<WithdrawalDecision, AppError> {
    let decision = {
        let mut request = state
            .withdrawals
            .get_mut(&withdrawal_id)
            .ok_or_else(|| AppError::NotFound(format!("withdrawal {withdrawal_id} not found")))?;
        ensure_requested(&request)?;

        let mut rider = state.riders.get_mut(&request.rider_id).ok_or_else(|| {
            AppError::NotFound(format!("rider {} not found", request.rider_id))
        })?;
        rider
            .wallet
            .debit(request.amount, None, format!("withdrawal {withdrawal_id}"))?;
        rider.updated_at = now;

        request.status = WithdrawalStatus::Approved;
        request.updated_at = now;

        WithdrawalDecision {
            request: request.clone(),
            remaining_balance: rider.wallet.balance(),
        }
    };

    state
        .metrics
        .wallet_operations_total
        .with_label_values(&["debit"])
        .inc();
    info!(
        withdrawal_id = %withdrawal_id,
        rider_id = %decision.request.rider_id,
        amount = %decision.request.amount,
        remaining = %decision.remaining_balance,
        "withdrawal approved"
    );
    state.notifications.notify(
        TargetType::Rider,
        decision.request.rider_id,
        format!("Your withdrawal of {} was approved.", decision.request.amount),
        None,
        None,
    );

    Ok(decision)
}

pub fn reject_withdrawal(
    state: &AppState,
    withdrawal_id: Uuid,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, AppError> {
    let request = {
        let mut request = state
            .withdrawals
            .get_mut(&withdrawal_id)
            .ok_or_else(|| AppError::NotFound(format!("withdrawal {withdrawal_id} not found")))?;
        ensure_requested(&request)?;
        request.status = WithdrawalStatus::Rejected;
        request.updated_at = now;
        request.clone()
    };

    info!(withdrawal_id = %withdrawal_id, rider_id = %request.rider_id, "withdrawal rejected");
    state.notifications.notify(
        TargetType::Rider,
        request.rider_id,
        format!("Your withdrawal of {} was rejected.", request.amount),
        None,
        None,
    );

    Ok(request)
}

fn ensure_requested(request: &WithdrawalRequest) -> Result<(), AppError> {
    if request.status != WithdrawalStatus::Requested {
        return Err(AppError::InvalidState(format!(
            "withdrawal {} is already {:?}",
            request.id, request.status
        )));
    }
    Ok(())
}

/// Newest first, optionally restricted to one rider.
pub fn list_withdrawals(state: &AppState, rider_id: Option<Uuid>) -> Vec<WithdrawalRequest> {
    let mut requests: Vec<WithdrawalRequest> = state
        .withdrawals
        .iter()
        .filter(|entry| rider_id.is_none_or(|id| entry.value().rider_id == id))
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}
