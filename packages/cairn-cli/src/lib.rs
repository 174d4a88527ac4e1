use std::path::PathBuf;

use clap::{
	Args,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

/// Arguments shared by every Cairn binary.
#[derive(Debug, Args)]
pub struct ConfigArgs {
	/// Path to the Cairn TOML config.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}
