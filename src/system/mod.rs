//! Host integration: reading the kernel's socket tables.

pub mod procfs;

pub use procfs::{load_socket_table, load_socket_table_from};
