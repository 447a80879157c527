pub mod delta;
pub mod report;
pub mod roc;
pub mod stripplot;
pub mod windows;
