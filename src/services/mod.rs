pub mod catalog;
pub mod logger;
pub mod outputs;
pub mod validation;
