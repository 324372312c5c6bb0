pub mod catalogs;
pub mod core;
pub mod main_module;
pub mod notifications;
pub mod reports;
pub mod risk;
pub mod tasks;

pub use crate::core::shared;
