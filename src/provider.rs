//! Auth provider capability interface and the Entra ID implementation.
//!
//! The console never talks to an identity endpoint directly. It drives an [`AuthProvider`],
//! which owns accounts, cached tokens, and redirect bookkeeping. Redirect-based operations do not
//! navigate anything themselves: they return a [`Navigation`] the host sends the user agent to,
//! and the host later feeds the resulting callback URL into [`AuthProvider::handle_redirect`].

pub mod entra;
pub mod session;

pub use entra::EntraProvider;
pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, TokenSecret},
};

/// Boxed future returned by asynchronous provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capabilities the console needs from an identity library.
pub trait AuthProvider
where
	Self: Send + Sync,
{
	/// Returns the account subsequent token requests act for.
	fn active_account(&self) -> Option<Account>;

	/// Selects (or clears) the active account.
	fn set_active_account(&self, account: Option<Account>);

	/// Returns every signed-in account in sign-in order.
	fn all_accounts(&self) -> Vec<Account>;

	/// Completes a redirect started by this provider.
	///
	/// Resolves to `None` when `callback` carries no authorization response.
	fn handle_redirect<'a>(
		&'a self,
		callback: &'a Url,
	) -> ProviderFuture<'a, Option<AuthenticationResult>>;

	/// Starts an interactive sign-in.
	fn login_redirect(&self, request: &TokenRequest) -> Result<Navigation>;

	/// Signs an account out (the active one when `account` is `None`).
	fn logout_redirect(&self, account: Option<&Account>) -> Result<Navigation>;

	/// Returns a token from cache or by refresh, without user interaction.
	///
	/// Fails with [`Error::InteractionRequired`] when only a redirect can produce a token.
	fn acquire_token_silent<'a>(
		&'a self,
		request: &'a TokenRequest,
	) -> ProviderFuture<'a, AuthenticationResult>;

	/// Starts an interactive token request.
	fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<Navigation>;
}

/// Parameters shared by sign-in and token requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Scopes to request.
	pub scopes: ScopeSet,
	/// Account to act for; the active account when `None`.
	pub account: Option<Account>,
	/// Skips cached access tokens when true.
	pub force_refresh: bool,
}
impl TokenRequest {
	/// Creates a request for the provided scopes.
	pub fn new(scopes: ScopeSet) -> Self {
		Self { scopes, account: None, force_refresh: false }
	}

	/// Pins the request to an account.
	pub fn for_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Forces the provider to bypass cached access tokens.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}
}

/// Tokens and account details produced by a successful acquisition.
#[derive(Clone)]
pub struct AuthenticationResult {
	/// Bearer token for the requested resource.
	pub access_token: TokenSecret,
	/// ID token from the same response, when one was issued.
	pub id_token: Option<TokenSecret>,
	/// Account the token was issued to.
	pub account: Account,
	/// Scopes the access token covers.
	pub scopes: ScopeSet,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
	/// `true` when served from the cache without contacting the token endpoint.
	pub from_cache: bool,
}
impl Debug for AuthenticationResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationResult")
			.field("account", &self.account.home_account_id)
			.field("scopes", &self.scopes)
			.field("expires_at", &self.expires_at)
			.field("from_cache", &self.from_cache)
			.finish()
	}
}

/// Why a navigation was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationKind {
	/// Interactive sign-in.
	Login,
	/// Interactive token request.
	AcquireToken,
	/// Sign-out.
	Logout,
}

/// URL the host must send the user agent to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
	/// Why the navigation was requested.
	pub kind: NavigationKind,
	/// Target URL.
	pub url: Url,
}
impl Display for Navigation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.url.as_str())
	}
}
