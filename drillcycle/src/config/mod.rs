//! Configuration file handling for `~/.drillcycle/config.ini`.
//!
//! - [`settings`] holds one plain struct per `[section]`
//! - [`defaults`] holds the `DEFAULT_*` constants and `ConfigFile::default()`
//! - [`parser`] maps INI keys onto the settings structs
//! - [`writer`] produces the commented INI written by `config init`
//!
//! # Example
//!
//! ```no_run
//! use drillcycle::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! config.validate()?;
//! println!("cycle length: {}s", config.cycle.duration_secs);
//! # Ok::<(), drillcycle::config::ConfigFileError>(())
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::*;
