pub mod notification;
pub mod position;
pub mod report;

pub use notification::{NotificationPermission, NotificationRecord, PendingNotification};
pub use position::UserPosition;
pub use report::{Candidate, Category, Report, ReportPriority, ReportStatus};
