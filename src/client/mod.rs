//! The page-side sensor.
//!
//! This module contains:
//! - [`SensorClient`], which keeps identity cookies and assembles events
//! - Link instrumentation for downloads and click attribution
//! - The [`Transport`] seam events leave through, with an HTTP implementation
//! - The callback registry acknowledgments are dispatched to

pub mod callbacks;
pub mod config;
pub mod environment;
pub mod links;
pub mod sensor;
pub mod transport;

// Re-export commonly used types
pub use callbacks::{CallbackRegistry, EventCallback};
pub use config::ClientConfig;
pub use environment::{EnvironmentProbe, StaticEnvironment};
pub use links::{Document, Link, LinkAction, LinkWatch, DEFAULT_DOWNLOAD_EXTENSIONS};
pub use sensor::{FormFields, InitOverride, PageContext, SensorClient};
pub use transport::{AckHandler, ClientError, Transport};

#[cfg(feature = "client")]
pub use transport::HttpTransport;
