pub mod assignment;
pub mod coupon;
pub mod notification;
pub mod order;
pub mod pharmacy;
pub mod rider;
pub mod user;
pub mod withdrawal;
