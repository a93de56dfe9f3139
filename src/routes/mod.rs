pub mod status;
pub mod upstream;
