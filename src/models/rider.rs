use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LicenseStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub order_id: Option<Uuid>,
    pub memo: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Credit => self.amount,
            TransactionKind::Debit => -self.amount,
        }
    }
}

/// Balance plus its ledger. Fields are private so the only way to move the
/// balance is through [`Wallet::credit`] / [`Wallet::debit`], which append
/// the matching transaction in the same call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Wallet {
    balance: Decimal,
    transactions: Vec<WalletTransaction>,
}

impl Wallet {
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    pub fn ledger_balance(&self) -> Decimal {
        self.transactions.iter().map(WalletTransaction::signed_amount).sum()
    }

    pub fn credit(
        &mut self,
        amount: Decimal,
        order_id: Option<Uuid>,
        memo: impl Into<String>,
    ) -> Result<&WalletTransaction, AppError> {
        if amount.is_sign_negative() {
            return Err(AppError::BadRequest(format!(
                "credit amount {amount} must not be negative"
            )));
        }
        self.record(TransactionKind::Credit, amount, order_id, memo.into())
    }

    pub fn debit(
        &mut self,
        amount: Decimal,
        order_id: Option<Uuid>,
        memo: impl Into<String>,
    ) -> Result<&WalletTransaction, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(format!(
                "debit amount {amount} must be positive"
            )));
        }
        if amount > self.balance {
            return Err(AppError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            });
        }
        self.record(TransactionKind::Debit, amount, order_id, memo.into())
    }

    fn record(
        &mut self,
        kind: TransactionKind,
        amount: Decimal,
        order_id: Option<Uuid>,
        memo: String,
    ) -> Result<&WalletTransaction, AppError> {
        let transaction = WalletTransaction {
            id: Uuid::new_v4(),
            kind,
            amount,
            order_id,
            memo,
            created_at: Utc::now(),
        };
        self.balance += transaction.signed_amount();
        self.transactions.push(transaction);
        self.transactions
            .last()
            .ok_or_else(|| AppError::Internal("wallet ledger append lost".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub account_holder_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    pub upi_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub availability: Availability,
    pub license_status: LicenseStatus,
    pub location: Option<GeoPoint>,
    pub base_fare: Option<Decimal>,
    pub capacity: u8,
    pub active_orders: u8,
    pub wallet: Wallet,
    pub bank_accounts: Vec<BankAccount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    /// Online, license-approved and below capacity.
    pub fn is_dispatchable(&self) -> bool {
        self.availability == Availability::Online
            && self.license_status == LicenseStatus::Approved
            && self.active_orders < self.capacity
    }

    pub fn effective_base_fare(&self, platform_default: Decimal) -> Decimal {
        self.base_fare.unwrap_or(platform_default)
    }

    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.active_orders as f64 / self.capacity as f64
    }
}
