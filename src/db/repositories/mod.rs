pub mod notifications;
pub mod reports;

pub use reports::NewReport;
