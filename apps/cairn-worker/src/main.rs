use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cairn_worker::Args::parse();

	cairn_worker::run(args).await
}
