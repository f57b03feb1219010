pub mod actions;
pub mod handlers;
