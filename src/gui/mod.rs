//! Terminal front end: the gesture prompt shown to the subject and the
//! little picker used to choose the transceiver's serial port. Everything
//! else about the session is driven from the command line.

mod error;
mod list_picker;
mod prompt_view;

pub use error::GuiError;
pub use list_picker::pick_from_list;
pub use prompt_view::TerminalPrompt;
