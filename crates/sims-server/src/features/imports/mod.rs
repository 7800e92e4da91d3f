//! Import job endpoints
//!
//! Upload a student-record file, poll progress, cancel, and download the
//! failed-record artifact.

mod routes;

pub use routes::routes;
