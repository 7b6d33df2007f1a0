//! Interactive test console: sign-in state, token acquisition, and one gateway call.
//!
//! [`Console`] is host-agnostic. Every operation updates a status line instead of failing, and
//! operations that need the user agent to visit the identity provider return a [`Navigation`]
//! for the host to follow.

// self
use crate::{
	_prelude::*,
	api::ApiClient,
	auth::{ScopeSet, TokenSecret},
	config::AppConfig,
	obs::{self, Operation},
	provider::{AuthProvider, Navigation, TokenRequest},
};

/// Status shown before any operation ran.
pub const READY: &str = "Ready.";

/// How [`Console::access_token`] completed.
#[derive(Clone, Debug)]
pub enum TokenOutcome {
	/// A token is available right away.
	Token(TokenSecret),
	/// The user agent must visit the identity provider; the token arrives via the callback.
	Redirect(Navigation),
}

/// Console state driven by host UI events.
pub struct Console {
	provider: Arc<dyn AuthProvider>,
	api: ApiClient,
	scopes: ScopeSet,
	scope_label: String,
	api_url: String,
	subscription_key: String,
	token: Option<TokenSecret>,
	status: String,
}
impl Console {
	/// Creates a console seeded from `config`.
	pub fn new(provider: Arc<dyn AuthProvider>, api: ApiClient, config: &AppConfig) -> Result<Self> {
		let console = Self {
			provider,
			api,
			scopes: config.login_scopes()?,
			scope_label: config.api_scope(),
			api_url: config.api_url.clone(),
			subscription_key: config.subscription_key.clone().unwrap_or_default(),
			token: None,
			status: READY.into(),
		};

		console.sync_active_account();

		Ok(console)
	}

	/// Completes a pending redirect, if `callback` carries one.
	pub async fn handle_redirect(&mut self, callback: &Url) {
		match self.provider.handle_redirect(callback).await {
			Ok(Some(result)) => self.provider.set_active_account(Some(result.account)),
			Ok(None) => self.sync_active_account(),
			Err(err) => {
				obs::error(Operation::HandleRedirect, &err);

				self.status = format!("Redirect error: {err}");

				self.sync_active_account();
			},
		}
	}

	/// Starts an interactive sign-in.
	pub fn sign_in(&mut self) -> Option<Navigation> {
		let request = TokenRequest::new(self.scopes.clone());

		match self.provider.login_redirect(&request) {
			Ok(navigation) => Some(navigation),
			Err(err) => {
				self.status = format!("Sign-in error: {err}");

				None
			},
		}
	}

	/// Signs the active account out and forgets the held token.
	pub fn sign_out(&mut self) -> Option<Navigation> {
		let account = self.provider.active_account();

		self.token = None;

		match self.provider.logout_redirect(account.as_ref()) {
			Ok(navigation) => Some(navigation),
			Err(err) => {
				self.status = format!("Sign-out error: {err}");

				None
			},
		}
	}

	/// Acquires an access token for the active account.
	///
	/// Falls back to an interactive redirect when silent acquisition needs user interaction.
	pub async fn access_token(&mut self) -> Result<TokenOutcome> {
		let Some(account) = self.provider.active_account() else {
			self.status = Error::NoActiveAccount.to_string();

			return Err(Error::NoActiveAccount);
		};
		let request = TokenRequest::new(self.scopes.clone()).for_account(account);

		match self.provider.acquire_token_silent(&request).await {
			Ok(result) => Ok(TokenOutcome::Token(result.access_token)),
			Err(err) if err.requires_interaction() => {
				obs::debug(Operation::AcquireTokenRedirect, &err);

				self.provider.acquire_token_redirect(&request).map(TokenOutcome::Redirect)
			},
			Err(err) => Err(err),
		}
	}

	/// "Get/Refresh Token": acquires and holds a token.
	pub async fn fetch_token(&mut self) -> Option<Navigation> {
		self.status = "Acquiring token...".into();

		match self.access_token().await {
			Ok(TokenOutcome::Token(token)) => {
				self.token = Some(token);
				self.status = "Token acquired. You can call APIM now.".into();

				None
			},
			Ok(TokenOutcome::Redirect(navigation)) => Some(navigation),
			Err(err) => {
				self.status = format!("Token error: {err}");

				None
			},
		}
	}

	/// "Call APIM": calls the gateway with the held token, acquiring one first when needed.
	pub async fn call_api(&mut self) -> Option<Navigation> {
		self.status = "Calling APIM...".into();

		let token = match self.token.clone() {
			Some(token) => token,
			None => match self.access_token().await {
				Ok(TokenOutcome::Token(token)) => token,
				Ok(TokenOutcome::Redirect(navigation)) => return Some(navigation),
				Err(err) => {
					self.status = format!("Call error: {err}");

					return None;
				},
			},
		};

		self.token = Some(token.clone());

		let key = Some(self.subscription_key.as_str()).filter(|key| !key.is_empty());

		self.status = match self.api.call(token.expose(), &self.api_url, key).await {
			Ok(response) => response.to_string(),
			Err(err) => format!("Call error: {err}"),
		};

		None
	}

	/// Replaces the gateway URL input.
	pub fn set_api_url(&mut self, url: impl Into<String>) {
		self.api_url = url.into();
	}

	/// Replaces the subscription key input; empty means no header.
	pub fn set_subscription_key(&mut self, key: impl Into<String>) {
		self.subscription_key = key.into();
	}

	/// Current status text.
	pub fn status(&self) -> &str {
		&self.status
	}

	/// Held access token, empty when none.
	pub fn token(&self) -> &str {
		self.token.as_ref().map(TokenSecret::expose).unwrap_or_default()
	}

	/// Gateway URL input.
	pub fn api_url(&self) -> &str {
		&self.api_url
	}

	/// Subscription key input.
	pub fn subscription_key(&self) -> &str {
		&self.subscription_key
	}

	/// API scope shown to the user.
	pub fn scope_label(&self) -> &str {
		&self.scope_label
	}

	/// `Signed in: <username>` or `Not signed in`.
	pub fn account_label(&self) -> String {
		match self.provider.active_account() {
			Some(account) => format!("Signed in: {}", account.username),
			None => "Not signed in".into(),
		}
	}

	fn sync_active_account(&self) {
		if self.provider.active_account().is_some() {
			return;
		}
		if let Some(first) = self.provider.all_accounts().into_iter().next() {
			self.provider.set_active_account(Some(first));
		}
	}
}
impl Debug for Console {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Console")
			.field("scope_label", &self.scope_label)
			.field("api_url", &self.api_url)
			.field("has_token", &self.token.is_some())
			.field("status", &self.status)
			.finish()
	}
}
impl Display for Console {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		writeln!(f, "[{}]", self.account_label())?;
		writeln!(f, "APIM URL: {}", self.api_url)?;
		writeln!(f, "Ocp-Apim-Subscription-Key (optional): {}", self.subscription_key)?;
		writeln!(f, "Scope requested: {}", self.scope_label)?;
		writeln!(f)?;
		writeln!(f, "HTTP Response")?;
		writeln!(f, "{}", self.status)?;
		writeln!(f)?;
		writeln!(f, "Access Token (raw JWT)")?;

		write!(f, "{}", self.token())
	}
}
