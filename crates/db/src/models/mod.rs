mod attachment;
mod pipe;
mod run;

pub use attachment::*;
pub use pipe::*;
pub use run::*;
