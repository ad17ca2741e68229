pub mod bill;
pub mod month;
pub mod rates;
pub mod schedule;
