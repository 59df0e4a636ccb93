pub mod error;
pub mod logging;

pub mod archive;
pub mod artifact;
pub mod classpath;
pub mod generator;
pub mod intersect;
pub mod model;

pub use error::{Result, StubError};
pub use generator::{StubOutcome, StubRequest, generate_stub};
