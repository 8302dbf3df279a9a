pub mod store;
pub mod task;
pub mod temporal;
