mod assessments;
mod clauses;
mod controls;
mod frameworks;

pub use assessments::*;
pub use clauses::*;
pub use controls::*;
pub use frameworks::*;
