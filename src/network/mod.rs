pub mod interface;
pub mod stack;

pub use interface::NetworkInterface;
pub use stack::{InstalledRouting, Ipv4Stack};
