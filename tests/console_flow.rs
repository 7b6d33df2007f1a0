// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use entra_apim_probe::{
	api::ApiClient,
	auth::{Account, AccountId, ScopeSet, TenantId, TokenSecret},
	config::{AppConfig, vars},
	console::{Console, READY, TokenOutcome},
	error::Error,
	provider::{
		AuthProvider, AuthenticationResult, Navigation, NavigationKind, ProviderFuture,
		TokenRequest,
	},
	reqwest::Client,
	url::Url,
};

#[derive(Clone, Copy)]
enum Silent {
	Token(&'static str),
	InteractionRequired,
	Fail,
}

struct FakeProvider {
	accounts: Mutex<Vec<Account>>,
	active: Mutex<Option<Account>>,
	silent: Silent,
	silent_calls: Mutex<usize>,
	navigations: Mutex<Vec<NavigationKind>>,
	redirect_result: Mutex<Option<Account>>,
}
impl FakeProvider {
	fn new(silent: Silent) -> Self {
		Self {
			accounts: Mutex::new(Vec::new()),
			active: Mutex::new(None),
			silent,
			silent_calls: Mutex::new(0),
			navigations: Mutex::new(Vec::new()),
			redirect_result: Mutex::new(None),
		}
	}

	fn signed_in(silent: Silent) -> Self {
		let provider = Self::new(silent);

		provider.accounts.lock().push(account("ada"));
		*provider.active.lock() = Some(account("ada"));

		provider
	}

	fn navigate(&self, kind: NavigationKind) -> Navigation {
		self.navigations.lock().push(kind);

		Navigation {
			kind,
			url: Url::parse("https://login.example.com/authorize")
				.expect("Navigation fixture should parse."),
		}
	}
}
impl AuthProvider for FakeProvider {
	fn active_account(&self) -> Option<Account> {
		self.active.lock().clone()
	}

	fn set_active_account(&self, account: Option<Account>) {
		*self.active.lock() = account;
	}

	fn all_accounts(&self) -> Vec<Account> {
		self.accounts.lock().clone()
	}

	fn handle_redirect<'a>(
		&'a self,
		callback: &'a Url,
	) -> ProviderFuture<'a, Option<AuthenticationResult>> {
		Box::pin(async move {
			if callback.query_pairs().any(|(key, _)| key == "error") {
				return Err(Error::Authorization {
					code: "access_denied".into(),
					reason: "User cancelled".into(),
				});
			}

			Ok(self.redirect_result.lock().take().map(|account| result(account, "access-cb")))
		})
	}

	fn login_redirect(&self, _: &TokenRequest) -> entra_apim_probe::error::Result<Navigation> {
		Ok(self.navigate(NavigationKind::Login))
	}

	fn logout_redirect(
		&self,
		_: Option<&Account>,
	) -> entra_apim_probe::error::Result<Navigation> {
		*self.active.lock() = None;

		Ok(self.navigate(NavigationKind::Logout))
	}

	fn acquire_token_silent<'a>(
		&'a self,
		request: &'a TokenRequest,
	) -> ProviderFuture<'a, AuthenticationResult> {
		Box::pin(async move {
			*self.silent_calls.lock() += 1;

			let account = request.account.clone().ok_or(Error::NoActiveAccount)?;

			match self.silent {
				Silent::Token(token) => Ok(result(account, token)),
				Silent::InteractionRequired => Err(Error::interaction_required(
					"interaction_required",
					"AADSTS50058: silent sign-in failed",
				)),
				Silent::Fail => Err(Error::InvalidClient { reason: "AADSTS700016".into() }),
			}
		})
	}

	fn acquire_token_redirect(
		&self,
		_: &TokenRequest,
	) -> entra_apim_probe::error::Result<Navigation> {
		Ok(self.navigate(NavigationKind::AcquireToken))
	}
}

fn account(name: &str) -> Account {
	Account {
		home_account_id: AccountId::from_parts(name, "tid").expect("Account id fixture."),
		local_account_id: name.into(),
		tenant_id: TenantId::new("tid").expect("Tenant id fixture."),
		username: format!("{name}@contoso.com"),
		name: None,
		login_hint: None,
	}
}

fn result(account: Account, token: &str) -> AuthenticationResult {
	AuthenticationResult {
		access_token: TokenSecret::new(token),
		id_token: None,
		account,
		scopes: ScopeSet::new(["api://api-client/todos.read"]).expect("Scope fixture."),
		expires_at: OffsetDateTime::now_utc() + Duration::HOUR,
		from_cache: true,
	}
}

fn config(api_url: &str, subscription_key: Option<&str>) -> AppConfig {
	let mut values = HashMap::from([
		(vars::TENANT, "contoso".to_owned()),
		(vars::SPA_CLIENT_ID, "spa-client".to_owned()),
		(vars::REDIRECT_URI, "http://localhost:5173".to_owned()),
		(vars::API_APP_CLIENT_ID, "api-client".to_owned()),
		(vars::API_SCOPE_NAME, "todos.read".to_owned()),
		(vars::APIM_URL, api_url.to_owned()),
	]);

	if let Some(key) = subscription_key {
		values.insert(vars::APIM_SUBSCRIPTION_KEY, key.to_owned());
	}

	AppConfig::from_lookup(move |name| values.get(name).cloned()).expect("Config fixture.")
}

/// Accepts the self-signed certificates served by `httpmock`.
fn mock_tls_client() -> ApiClient {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("TLS-relaxed client should build.");

	ApiClient::with_client(client)
}

fn build_console(provider: &Arc<FakeProvider>) -> Console {
	Console::new(
		provider.clone(),
		mock_tls_client(),
		&config("https://gateway.example.com/todos", None),
	)
	.expect("Console should build.")
}

#[tokio::test]
async fn token_without_account_asks_to_sign_in() {
	let provider = Arc::new(FakeProvider::new(Silent::Token("unused")));
	let mut console = build_console(&provider);

	assert_eq!(console.status(), READY);
	assert_eq!(console.account_label(), "Not signed in");

	let err = console.access_token().await.expect_err("No account must fail.");

	assert!(matches!(err, Error::NoActiveAccount));
	assert_eq!(console.status(), "No user signed in. Click Sign in.");
	assert!(console.fetch_token().await.is_none());
	assert_eq!(console.status(), "Token error: No user signed in. Click Sign in.");
	assert_eq!(*provider.silent_calls.lock(), 0);
	assert!(console.token().is_empty());
}

#[tokio::test]
async fn interaction_required_starts_a_token_redirect() {
	let provider = Arc::new(FakeProvider::signed_in(Silent::InteractionRequired));
	let mut console = build_console(&provider);

	match console.access_token().await.expect("Interaction must not be an error.") {
		TokenOutcome::Redirect(navigation) =>
			assert_eq!(navigation.kind, NavigationKind::AcquireToken),
		TokenOutcome::Token(_) => panic!("Interaction-required must redirect."),
	}

	let navigation = console.fetch_token().await.expect("Fetch should hand back a navigation.");

	assert_eq!(navigation.kind, NavigationKind::AcquireToken);
	assert_eq!(
		*provider.navigations.lock(),
		vec![NavigationKind::AcquireToken, NavigationKind::AcquireToken]
	);
	assert!(console.token().is_empty());
}

#[tokio::test]
async fn other_token_failures_are_reported() {
	let provider = Arc::new(FakeProvider::signed_in(Silent::Fail));
	let mut console = build_console(&provider);

	assert!(console.fetch_token().await.is_none());
	assert_eq!(console.status(), "Token error: Client authentication failed: AADSTS700016.");
	assert!(provider.navigations.lock().is_empty());
}

#[tokio::test]
async fn fetched_token_is_held_and_reused_for_calls() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/todos")
				.header("authorization", "Bearer access-1")
				.header("ocp-apim-subscription-key", "key-1");
			then.status(201).body("created");
		})
		.await;
	let provider = Arc::new(FakeProvider::signed_in(Silent::Token("access-1")));
	let mut console = Console::new(
		provider.clone(),
		mock_tls_client(),
		&config(&server.url("/todos"), Some("key-1")),
	)
	.expect("Console should build.");

	assert_eq!(console.subscription_key(), "key-1");
	assert_eq!(console.scope_label(), "api://api-client/todos.read");
	assert!(console.fetch_token().await.is_none());
	assert_eq!(console.status(), "Token acquired. You can call APIM now.");
	assert_eq!(console.token(), "access-1");
	assert!(console.call_api().await.is_none());
	assert_eq!(console.status(), "HTTP 201\ncreated");
	assert_eq!(*provider.silent_calls.lock(), 1);

	mock.assert_async().await;
}

#[tokio::test]
async fn call_without_token_acquires_one_first() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/todos").header("authorization", "Bearer access-2");
			then.status(500).body("backend down");
		})
		.await;
	let provider = Arc::new(FakeProvider::signed_in(Silent::Token("access-2")));
	let mut console = build_console(&provider);

	console.set_api_url(server.url("/todos"));

	assert!(console.call_api().await.is_none());
	assert_eq!(console.status(), "HTTP 500\nbackend down");
	assert_eq!(console.token(), "access-2");

	mock.assert_async().await;
}

#[tokio::test]
async fn call_follows_the_redirect_path() {
	let provider = Arc::new(FakeProvider::signed_in(Silent::InteractionRequired));
	let mut console = build_console(&provider);
	let navigation = console.call_api().await.expect("Call should hand back a navigation.");

	assert_eq!(navigation.kind, NavigationKind::AcquireToken);
	assert_eq!(console.status(), "Calling APIM...");
}

#[tokio::test]
async fn call_errors_are_reported() {
	let provider = Arc::new(FakeProvider::new(Silent::Token("unused")));
	let mut console = build_console(&provider);

	assert!(console.call_api().await.is_none());
	assert_eq!(console.status(), "Call error: No user signed in. Click Sign in.");

	let provider = Arc::new(FakeProvider::signed_in(Silent::Token("access-3")));
	let mut console = build_console(&provider);

	console.set_api_url("not a url");

	assert!(console.call_api().await.is_none());
	assert!(console.status().starts_with("Call error: "));
}

#[tokio::test]
async fn redirect_result_becomes_active_and_first_account_is_adopted() {
	let provider = Arc::new(FakeProvider::new(Silent::Token("unused")));

	provider.accounts.lock().extend([account("first"), account("second")]);

	let mut console = build_console(&provider);

	assert_eq!(console.account_label(), "Signed in: first@contoso.com");

	*provider.redirect_result.lock() = Some(account("second"));

	console
		.handle_redirect(
			&Url::parse("http://localhost:5173/?code=abc&state=xyz").expect("Callback fixture."),
		)
		.await;

	assert_eq!(console.account_label(), "Signed in: second@contoso.com");
	assert_eq!(console.status(), READY);
}

#[tokio::test]
async fn redirect_failures_are_shown_not_propagated() {
	let provider = Arc::new(FakeProvider::new(Silent::Token("unused")));
	let mut console = build_console(&provider);

	console
		.handle_redirect(
			&Url::parse("http://localhost:5173/?error=access_denied").expect("Callback fixture."),
		)
		.await;

	assert_eq!(console.status(), "Redirect error: Authorization failed (access_denied): User cancelled.");
}

#[tokio::test]
async fn sign_in_and_sign_out_navigate() {
	let provider = Arc::new(FakeProvider::signed_in(Silent::Token("access-1")));
	let mut console = build_console(&provider);

	assert_eq!(console.sign_in().map(|navigation| navigation.kind), Some(NavigationKind::Login));
	assert!(console.fetch_token().await.is_none());
	assert_eq!(console.token(), "access-1");
	assert_eq!(console.sign_out().map(|navigation| navigation.kind), Some(NavigationKind::Logout));
	assert!(console.token().is_empty());
	assert_eq!(console.account_label(), "Not signed in");

	let rendered = console.to_string();

	assert!(rendered.starts_with("[Not signed in]\n"));
	assert!(rendered.contains("Scope requested: api://api-client/todos.read"));
}
