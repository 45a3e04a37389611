use std::str::FromStr;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

static RELOAD_HANDLE: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	#[default]
	Default,
	Json,
	Pretty,
	Compact,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
	#[error("invalid log level: {0}")]
	InvalidLevel(#[from] tracing_subscriber::filter::ParseError),
	#[error("failed to init logger: {0}")]
	Init(#[from] tracing_subscriber::util::TryInitError),
	#[error("failed to reload logger: {0}")]
	Reload(#[from] reload::Error),
}

/// Installs the global subscriber, or changes the filter level if one was already
/// installed by an earlier call. The mode only applies to the first call.
pub fn init(level: &str, mode: Mode) -> Result<(), LoggingError> {
	let env_filter = EnvFilter::from_str(level)?;

	if let Some(handle) = RELOAD_HANDLE.get() {
		handle.reload(env_filter)?;
		return Ok(());
	}

	RELOAD_HANDLE.get_or_try_init(|| {
		let (filter, handle) = reload::Layer::new(env_filter);

		let fmt = tracing_subscriber::fmt::layer().with_line_number(true).with_file(true);
		let fmt = match mode {
			Mode::Default => fmt.boxed(),
			Mode::Json => fmt.json().boxed(),
			Mode::Pretty => fmt.pretty().boxed(),
			Mode::Compact => fmt.compact().boxed(),
		};

		tracing_subscriber::registry().with(filter).with(fmt).try_init()?;

		Ok::<_, LoggingError>(handle)
	})?;

	Ok(())
}

pub fn init_from_config(config: &crate::config::LoggingConfig) -> Result<(), LoggingError> {
	init(&config.level, config.mode)
}
