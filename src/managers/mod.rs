pub mod access;
pub mod api;
pub mod output;
pub mod postgres;
