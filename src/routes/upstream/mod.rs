mod handler;

pub use handler::{CACHE_STATUS_HEADER, analyze, translate};
