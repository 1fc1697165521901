//! Network Manager: the fleet registry producers announce themselves to over
//! `/servers`, queryable by consumers over `/list`.

mod fleet;
mod network_manager;

pub use fleet::{Fleet, FleetStats};
pub use network_manager::NetworkManager;
