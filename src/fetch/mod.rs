pub mod classify;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod navigate;
pub mod result;
pub mod scripts;
pub mod task;
