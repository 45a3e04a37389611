use std::path::Path;

use serde::de::DeserializeOwned;

use crate::logging;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// The log level to use, this is a tracing env filter
	pub level: String,

	/// What logging mode we should use
	pub mode: logging::Mode,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			mode: logging::Mode::Default,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// The name prefix for threads that take over dispatching when a task suspends
	pub thread_name: String,

	/// The stack size in bytes for those threads, the platform default if unset
	pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			thread_name: "scheduler".to_string(),
			stack_size: None,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DataLoaderConfig {
	/// The name recorded on the loader's tracing spans, defaults to the loader type name
	pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
	/// The logging configuration
	pub logging: LoggingConfig,

	/// The scheduler configuration
	pub scheduler: SchedulerConfig,

	/// The data loader configuration
	pub dataloader: DataLoaderConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Yaml(#[from] serde_yaml::Error),
}

pub fn parse_str<C: DeserializeOwned + Default>(contents: &str) -> Result<C, ConfigError> {
	if contents.trim().is_empty() {
		return Ok(C::default());
	}

	Ok(serde_yaml::from_str(contents)?)
}

/// Loads `C` from a YAML file.
///
/// Returns the config along with the canonical path of the file it was read from.
/// A missing file is not an error, the defaults are used instead.
pub fn parse<C: DeserializeOwned + Default>(
	config_file: Option<impl AsRef<Path>>,
) -> Result<(C, Option<String>), ConfigError> {
	let Some(path) = config_file else {
		return Ok((C::default(), None));
	};
	let path = path.as_ref();

	match std::fs::read_to_string(path) {
		Ok(contents) => {
			let config = parse_str(&contents)?;
			let path = std::fs::canonicalize(path)?;
			Ok((config, Some(path.display().to_string())))
		}
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
			tracing::debug!("failed to load config file: {}", err);
			Ok((C::default(), None))
		}
		Err(err) => Err(err.into()),
	}
}
