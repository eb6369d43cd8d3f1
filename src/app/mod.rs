pub mod http;
pub mod local_store;
pub mod memory_store;
pub mod service;
