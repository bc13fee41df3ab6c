//! Link driver for the eBUS bridge: wires the sans-IO
//! [`ebus_link`] engine to a real adapter socket and a broker
//! collaborator.

pub mod broker;
pub mod config;
pub mod driver;
pub mod envelope;
pub mod errors;
pub mod transport;

pub use broker::{BrokerClient, LoopbackBroker};
pub use config::Config;
pub use driver::Driver;
pub use envelope::{TelegramPayload, TelegramRequest};
pub use errors::{BrokerError, RequestError, TransportError};
pub use transport::{AdapterTransport, TcpAdapterTransport};
