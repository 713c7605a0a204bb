pub mod approval;
pub mod execution;
pub mod request;
pub mod resource;
