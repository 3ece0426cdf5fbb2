pub mod error;
pub mod registry;
pub mod request;
pub mod service;

pub use error::{ErrorKind, ServiceError};
pub use registry::{Connection, ConnectionView, Registry, RegistryError};
pub use request::{ConnectRequest, HistoryRequest};
pub use service::{ConnectOutcome, ConnectionService, HistoryPage};
