pub mod authority;
pub mod config;
pub mod dns;
pub mod error;
pub mod fallthrough;
pub mod handler;
pub mod provider;
pub mod refresh;
pub mod resolver;
pub mod server;
pub mod shutdown;
pub mod zone;

pub use authority::{AuthoritySettings, ScalewayAuthority};
pub use dns::DNSPacket;
pub use resolver::{QueryResolver, Resolution};
