mod history;
mod stats;
mod study_plan;

pub use history::*;
pub use stats::*;
pub use study_plan::*;
