//! Terminal host for the probe console.
//!
//! Reads settings from the environment (a `.env` file is loaded first), then accepts commands on
//! stdin. Redirect URLs are printed; open them in a browser, then paste the URL the browser lands
//! on back with `callback <url>`.
//!
//! ```text
//! signin | token | call | signout | url <apim-url> | key [<subscription-key>] | callback <url> | quit
//! ```

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
// self
use entra_apim_probe::{
	api::ApiClient,
	config::AppConfig,
	console::Console,
	provider::{AuthProvider, EntraProvider, Navigation},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	dotenvy::dotenv().ok();
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
		.init();

	let config = AppConfig::from_env()?;
	let provider: Arc<dyn AuthProvider> = Arc::new(EntraProvider::new(config.clone())?);
	let mut console = Console::new(provider, ApiClient::default(), &config)?;
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	println!("{console}\n");

	while let Some(line) = lines.next_line().await? {
		let (command, argument) = match line.trim().split_once(char::is_whitespace) {
			Some((command, argument)) => (command, argument.trim()),
			None => (line.trim(), ""),
		};
		let navigation = match command {
			"signin" => console.sign_in(),
			"token" => console.fetch_token().await,
			"call" => console.call_api().await,
			"signout" => console.sign_out(),
			"url" => {
				console.set_api_url(argument);

				None
			},
			"key" => {
				console.set_subscription_key(argument);

				None
			},
			"callback" => {
				match Url::parse(argument) {
					Ok(callback) => console.handle_redirect(&callback).await,
					Err(e) => eprintln!("Not a URL: {e}."),
				}

				None
			},
			"quit" | "exit" => break,
			"" => continue,
			other => {
				eprintln!("Unknown command `{other}`.");

				continue;
			},
		};

		println!("{console}\n");

		if let Some(Navigation { url, .. }) = navigation {
			println!("Open in a browser:\n{url}\n");
		}
	}

	Ok(())
}
