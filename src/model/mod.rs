pub mod advance;
pub mod attendance;
pub mod business;
pub mod claim;
pub mod feature;
pub mod request_status;
pub mod role;
pub mod user;
