pub mod banner;
pub mod clock;
pub mod errors;
pub mod logger;
pub mod types;

pub use clock::*;
pub use errors::*;
pub use logger::*;
pub use types::*;
