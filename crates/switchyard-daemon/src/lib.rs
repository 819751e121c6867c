//! # Switchyard Daemon
//!
//! Host process around the engine: configuration, catalog construction,
//! tick timer, price feeds, notification drain and the remote console link.

pub mod catalog;
pub mod config;
pub mod drain;
pub mod link;
pub mod ticker;

pub use catalog::{build as build_catalog, LoadedCatalog};
pub use config::DaemonConfig;
pub use drain::NotificationDrain;
pub use link::{RemoteReceiver, RemoteSender, REMOTE_GROUP, REMOTE_PORT};
pub use ticker::tick_loop;
