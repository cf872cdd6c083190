pub mod context;
pub mod error_log;
pub mod item_scope;
pub mod spout_state;
