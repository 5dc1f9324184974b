pub use catalog::*;
pub use error::*;
pub use events::*;
pub use resolver::*;
pub use scoring::*;
pub use session::*;
pub use simulator::*;
pub use storage::*;
pub use types::*;
pub use variant::*;

mod catalog;
mod error;
mod events;
mod resolver;
mod scoring;
mod session;
mod simulator;
mod storage;
mod types;
mod variant;
