pub mod message;
pub mod project;
pub mod turn;
pub mod user;
