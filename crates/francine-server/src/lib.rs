pub mod actor;
pub mod retry;
