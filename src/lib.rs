//! # config-transform
//!
//! Apply an environment-specific XDT transform (`web.staging-HLG.config`) onto
//! the base `web.config`/`app.config` next to it, with a verified backup and
//! rollback when the transform fails.
//!
//! ## Usage
//!
//! ```bash
//! config-transform apply web.staging-HLG.config [--yes] [--force]
//! config-transform resolve web.staging-HLG.config
//! config-transform list [DIR]
//! config-transform restore web.config [--yes]
//! ```
//!
//! ## Modules
//!
//! - `resolver` - Filename conventions: base file lookup, environment labels, eligibility
//! - `engine` - Transform engine contract and the bundled XDT engine
//! - `apply` - Backup, single-flight lock and rollback around an engine run
//! - `interaction` - Yes/no prompt and message surface
//! - `workflow` - Resolve, confirm, apply and report; reload hooks
//! - `config` - Layered TOML configuration
//! - `error` - Error taxonomy with numeric codes
//! - `testing` - Testing utilities and fixtures
pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod resolver;
pub mod workflow;

pub mod testing;
