mod connection;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;
pub use helpers::decode_location;
pub use repositories::NewReport;
