mod actions;
mod matrices;
mod risks;

pub use actions::*;
pub use matrices::*;
pub use risks::*;
