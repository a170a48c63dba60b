pub mod activity;
pub mod api;
pub mod bookmark;
pub mod job;
pub mod review;
