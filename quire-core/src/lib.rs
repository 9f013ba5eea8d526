pub mod access;
pub mod filesystem;
pub mod store;
pub mod util;
