pub mod config;
pub mod error;
pub mod helper;
pub mod network;
pub mod protocol;
pub mod sim;

pub use config::{PrintingOption, ProtocolConfig, SplitHorizon};
pub use error::{RoutingError, RoutingResult};
pub use helper::{PioHelper, ProtocolStatus};
pub use network::{InstalledRouting, Ipv4Stack, NetworkInterface};
pub use protocol::{PioRoutingProtocol, ProtocolTimer, RouteEntry, RouteId, RouteLifetime, Validity};
pub use sim::{Scheduler, Simulator, TimerQueue};

pub type NodeId = u32;
pub type InterfaceId = u32;
