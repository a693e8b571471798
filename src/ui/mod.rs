//! Terminal dashboard

mod app;
pub mod theme;
mod widgets;

pub use app::{AppState, Dashboard, LogEntry};
pub use theme::ThemeColors;
pub use widgets::*;
