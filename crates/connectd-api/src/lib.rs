// connectd-api: Async clients for the connect protocol backends
// (accesspoint, dealer, login5, spclient) and endpoint resolution.

pub mod accesspoint;
pub mod connect_state;
pub mod dealer;
pub mod error;
pub mod login5;
pub mod resolver;
pub mod spclient;
pub mod transport;

pub use accesspoint::{Accesspoint, Packet, PacketType};
pub use dealer::{Dealer, Message};
pub use error::Error;
pub use login5::{AccessToken, Login5};
pub use resolver::{ApResolver, Resolver, StaticResolver};
pub use spclient::Spclient;
pub use transport::TransportConfig;

/// Software version reported to every backend.
pub const VERSION_STRING: &str = concat!("connectd ", env!("CARGO_PKG_VERSION"));
