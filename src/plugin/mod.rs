pub mod installer;
pub mod manager;
pub mod manifest;
pub mod permission;
pub mod runtime;

pub use manager::PermissionReviewer;
