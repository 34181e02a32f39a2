//! Terminal front end: one tab per open document, a sortable table of its
//! manufacturers, and modal forms and prompts layered on top.

mod app;
mod forms;
mod helpers;
mod terminal;

pub use app::App;
pub use terminal::run_app;
