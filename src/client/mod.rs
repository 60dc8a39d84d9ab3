//! Listener side: clock reconciliation, drift correction and the room connection.

mod backoff;
pub mod connection;
pub mod constants;
pub mod drift;
pub mod local;
pub mod player;
pub mod reconciler;
pub mod session;

pub use connection::{ClientCommand, ClientOptions, RoomClient};
pub use drift::{DriftAction, DriftConfig, DriftController, SyncStatus};
pub use local::LocalRoom;
pub use player::{MediaPlayer, SimulatedPlayer};
pub use reconciler::Reconciler;
pub use session::{Flow, ListenerSession};
