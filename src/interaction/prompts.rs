//! User prompting implementation

use anyhow::Result;
use std::io::{self, Write};

/// Trait for user prompting
pub trait UserPrompter: Send + Sync {
    /// Prompt for yes/no confirmation; empty input picks `default`
    fn prompt_yes_no(&self, message: &str, default: bool) -> Result<bool>;
}

/// Real implementation of user prompter reading from stdin
pub struct UserPrompterImpl;

impl Default for UserPrompterImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl UserPrompterImpl {
    pub fn new() -> Self {
        Self
    }

    fn read_line() -> Result<String> {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    /// Format the yes/no suffix, capitalizing the default answer
    pub fn format_yes_no_prompt(message: &str, default: bool) -> String {
        let choices = if default { "[Y/n]" } else { "[y/N]" };
        format!("{message} {choices}: ")
    }

    /// Interpret an answer; anything unrecognized counts as "no"
    pub fn parse_yes_no(input: &str, default: bool) -> bool {
        match input.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    }
}

impl UserPrompter for UserPrompterImpl {
    fn prompt_yes_no(&self, message: &str, default: bool) -> Result<bool> {
        print!("{}", Self::format_yes_no_prompt(message, default));
        io::stdout().flush()?;

        let input = Self::read_line()?;
        Ok(Self::parse_yes_no(&input, default))
    }
}
