pub mod clock;
pub mod registry;
pub mod state;
pub mod sync;

pub use clock::*;
pub use registry::*;
pub use state::*;
pub use sync::*;
