pub mod fs_atomic;
pub mod paths;
pub mod redact;
pub mod sql;
pub mod template;
