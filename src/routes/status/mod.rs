mod handler;
mod model;

pub use handler::status;
pub use model::StatusResponse;
