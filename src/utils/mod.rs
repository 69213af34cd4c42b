pub mod helpers;
pub mod prompt;

pub use helpers::*;
pub use prompt::{parse_selection, prompt_line, prompt_yes_no, TermConfirm};
