mod commands;
mod paths;

pub mod elevation;
pub mod process;

pub use commands::HideWindow;
pub use paths::{AppPaths, AppPathsError};
