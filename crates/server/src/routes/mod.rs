mod connectors;
mod health;
pub mod pipes;
pub mod runs;
mod ws;

pub use connectors::*;
pub use health::*;
pub use pipes::*;
pub use runs::*;
pub use ws::*;
