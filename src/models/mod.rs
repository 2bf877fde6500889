pub mod notification;
pub mod parcel;
pub mod payment;
pub mod rider;
pub mod tracking;
pub mod user;
