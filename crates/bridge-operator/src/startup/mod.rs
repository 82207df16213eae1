//! Startup checks for the controller
//!
//! The controller only starts once the cluster can serve InferenceServices.

mod capability;

pub use capability::wait_for_inference_services;
