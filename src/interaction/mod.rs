//! User interaction surface
//!
//! The workflow only needs a yes/no prompt and a place to put messages.
//! Anything that can provide those (a terminal, an editor plugin, a test
//! double) implements [`UserInteraction`].

pub mod display;
pub mod prompts;

pub use display::{MessageDisplay, MessageDisplayImpl};
pub use prompts::{UserPrompter, UserPrompterImpl};

use anyhow::Result;

/// Trait for user interaction
pub trait UserInteraction: Send + Sync {
    /// Prompt user for yes/no confirmation; `default` is used on empty input
    fn prompt_yes_no(&self, message: &str, default: bool) -> Result<bool>;

    /// Display information message
    fn display_info(&self, message: &str);

    /// Display warning message
    fn display_warning(&self, message: &str);

    /// Display error message
    fn display_error(&self, message: &str);

    /// Display success message
    fn display_success(&self, message: &str);
}

/// Default implementation of user interaction
pub struct DefaultUserInteraction {
    prompter: UserPrompterImpl,
    display: MessageDisplayImpl,
}

impl Default for DefaultUserInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultUserInteraction {
    pub fn new() -> Self {
        Self {
            prompter: UserPrompterImpl::new(),
            display: MessageDisplayImpl::new(),
        }
    }
}

impl UserInteraction for DefaultUserInteraction {
    fn prompt_yes_no(&self, message: &str, default: bool) -> Result<bool> {
        self.prompter.prompt_yes_no(message, default)
    }

    fn display_info(&self, message: &str) {
        self.display.info(message);
    }

    fn display_warning(&self, message: &str) {
        self.display.warning(message);
    }

    fn display_error(&self, message: &str) {
        self.display.error(message);
    }

    fn display_success(&self, message: &str) {
        self.display.success(message);
    }
}
