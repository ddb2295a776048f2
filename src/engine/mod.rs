pub mod assignment;
pub mod lifecycle;
pub mod retry;
pub mod selector;
pub mod withdrawals;
