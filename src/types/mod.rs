pub mod month;
pub mod reporting_group;
