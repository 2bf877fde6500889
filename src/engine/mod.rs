pub mod lifecycle;
pub mod notify;
pub mod reports;
pub mod riders;
pub mod settlement;
pub mod tracking;
pub mod tracking_id;
pub mod users;
