//! Entra ID implementation of [`AuthProvider`].
//!
//! Sign-in and interactive token requests start an [`AuthorizationSession`] and hand the
//! authorize URL back to the host. The redirect callback redeems the code with its PKCE verifier,
//! validates the ID token nonce, and caches the account plus tokens in a [`SessionCache`]. Silent
//! acquisition serves cached access tokens until they come within five minutes of expiry, then
//! redeems the cached refresh token under a per-(account, scope) singleflight guard.

// self
use crate::{
	_prelude::*,
	auth::{
		Account, IdTokenClaims, IdTokenError, ScopeSet, TokenRecord, TokenRecordBuilderError,
		TokenSecret,
	},
	cache::{CacheKey, SessionCache},
	config::{AppConfig, Authority},
	error::{ConfigError, INTERACTION_REQUIRED_CODES},
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{EntraFacade, TokenGrant},
	obs::{self, Operation, OperationSpan, Outcome},
	provider::{
		AuthProvider, AuthenticationResult, AuthorizationSession, Navigation, NavigationKind,
		ProviderFuture, TokenRequest,
	},
};

/// Access tokens expiring within this window are renewed instead of served from cache.
pub const EXPIRY_OFFSET: Duration = Duration::seconds(300);

const OIDC_REQUEST_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// [`AuthProvider`] backed by the Entra ID v2.0 endpoints of one tenant.
pub struct EntraProvider<C = ReqwestHttpClient>
where
	C: ?Sized + TokenHttpClient,
{
	config: AppConfig,
	authority: Authority,
	facade: EntraFacade<C>,
	cache: SessionCache,
	pending: Mutex<HashMap<String, AuthorizationSession>>,
	flow_guards: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}
impl EntraProvider {
	/// Creates a provider using a reqwest transport configured for SPA token redemption.
	pub fn new(config: AppConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::for_spa(&config.redirect_uri)?;

		Self::with_http_client(config, Arc::new(http_client))
	}

	/// Creates a provider whose SPA transport starts from a caller-configured reqwest builder.
	pub fn with_client_builder(
		config: AppConfig,
		builder: reqwest::ClientBuilder,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::for_spa_with_builder(builder, &config.redirect_uri)?;

		Self::with_http_client(config, Arc::new(http_client))
	}
}
impl<C> EntraProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a provider on top of a caller-supplied token transport.
	pub fn with_http_client(config: AppConfig, http_client: Arc<C>) -> Result<Self> {
		let authority = config.authority()?;
		let facade = EntraFacade::new(
			&config.spa_client_id,
			&authority,
			&config.redirect_uri,
			http_client,
		)?;

		Ok(Self {
			config,
			authority,
			facade,
			cache: SessionCache::default(),
			pending: Default::default(),
			flow_guards: Default::default(),
		})
	}

	/// Configuration the provider was built from.
	pub fn config(&self) -> &AppConfig {
		&self.config
	}

	/// Endpoints of the configured tenant.
	pub fn authority(&self) -> &Authority {
		&self.authority
	}

	/// Session cache shared with the provider.
	pub fn cache(&self) -> &SessionCache {
		&self.cache
	}

	/// Number of redirects started but not yet completed.
	pub fn pending_redirects(&self) -> usize {
		self.pending.lock().len()
	}

	fn start_redirect(
		&self,
		kind: NavigationKind,
		scopes: &ScopeSet,
		login_hint: Option<&str>,
	) -> Result<Navigation> {
		let scope = with_oidc_scopes(scopes)?;
		let session = AuthorizationSession::start(
			kind,
			&self.authority.authorize,
			&self.config.spa_client_id,
			&self.config.redirect_uri,
			scope,
			login_hint,
		);
		let url = session.authorize_url.clone();

		let mut pending = self.pending.lock();

		// One interaction at a time; a new redirect supersedes any unfinished one.
		pending.clear();
		pending.insert(session.state.clone(), session);

		Ok(Navigation { kind, url })
	}

	async fn complete_redirect(&self, callback: &Url) -> Result<Option<AuthenticationResult>> {
		let Some(params) = RedirectParams::from_callback(callback) else {
			return Ok(None);
		};
		// Sessions are single-use, whatever the callback carries.
		let session = params.state.as_deref().and_then(|state| self.pending.lock().remove(state));

		if let Some(code) = params.error {
			let reason = params.error_description.unwrap_or_else(|| code.clone());

			return Err(if INTERACTION_REQUIRED_CODES.contains(&code.as_str()) {
				Error::interaction_required(code, reason)
			} else {
				Error::Authorization { code, reason }
			});
		}

		let session = session.ok_or_else(|| Error::InvalidGrant {
			reason: "Authorization state is unknown or already used.".into(),
		})?;
		let code = params.code.ok_or_else(|| Error::InvalidGrant {
			reason: "Authorization response carries no code.".into(),
		})?;
		let grant = self
			.facade
			.exchange_authorization_code(
				&code,
				session.pkce_verifier(),
				&session.scope,
				&session.redirect_uri,
			)
			.await?;
		let id_token = grant.id_token.as_deref().ok_or(IdTokenError::Missing)?;
		let claims = IdTokenClaims::decode(id_token)?;

		session.validate_nonce(claims.nonce.as_deref())?;

		let account = Account::from_claims(&claims, &self.config.tenant)?;
		let record = build_record(
			&account,
			session.scope.resource_scopes(),
			&grant,
			None,
			OffsetDateTime::now_utc(),
		)?;
		let result = authentication_result(&account, &record, false);

		self.cache.save_record(record);
		self.cache.set_active_account(Some(account));

		Ok(Some(result))
	}

	async fn silent(&self, request: &TokenRequest) -> Result<AuthenticationResult> {
		let account = request
			.account
			.clone()
			.or_else(|| self.cache.active_account())
			.ok_or(Error::NoActiveAccount)?;
		let scope = request.scopes.resource_scopes();
		let guard = self.flow_guard(&CacheKey::new(&account.home_account_id, &scope));
		let _singleflight = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		let current = self.cache.fetch_record(&account.home_account_id, &scope);

		if let Some(record) = current
			.as_ref()
			.filter(|record| !request.force_refresh && !record.expires_within(EXPIRY_OFFSET, now))
		{
			return Ok(authentication_result(&account, record, true));
		}

		let refresh_token = current
			.as_ref()
			.and_then(|record| record.refresh_token.clone())
			.or_else(|| self.cache.refresh_token(&account.home_account_id))
			.ok_or_else(|| {
				Error::interaction_required(
					"no_tokens_found",
					"No refresh token is cached for the account",
				)
			})?;
		let grant = match self
			.facade
			.refresh_token(refresh_token.expose(), &with_oidc_scopes(&request.scopes)?)
			.await
		{
			Ok(grant) => grant,
			Err(Error::InvalidGrant { reason }) => {
				self.cache.remove_record(&account.home_account_id, &scope);

				return Err(Error::interaction_required("invalid_grant", reason));
			},
			Err(err) => {
				if err.requires_interaction() {
					self.cache.remove_record(&account.home_account_id, &scope);
				}

				return Err(err);
			},
		};
		let record = build_record(
			&account,
			scope,
			&grant,
			Some(&refresh_token),
			OffsetDateTime::now_utc(),
		)?;
		let result = authentication_result(&account, &record, false);

		self.cache.save_record(record);

		Ok(result)
	}

	fn flow_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl<C> AuthProvider for EntraProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn active_account(&self) -> Option<Account> {
		self.cache.active_account()
	}

	fn set_active_account(&self, account: Option<Account>) {
		self.cache.set_active_account(account);
	}

	fn all_accounts(&self) -> Vec<Account> {
		self.cache.accounts()
	}

	fn handle_redirect<'a>(
		&'a self,
		callback: &'a Url,
	) -> ProviderFuture<'a, Option<AuthenticationResult>> {
		const OPERATION: Operation = Operation::HandleRedirect;

		Box::pin(async move {
			let span = OperationSpan::new(OPERATION, "handle_redirect");

			obs::record_outcome(OPERATION, Outcome::Attempt);

			let result = span.instrument(self.complete_redirect(callback)).await;

			match &result {
				Ok(_) => obs::record_outcome(OPERATION, Outcome::Success),
				Err(err) => {
					obs::warn(OPERATION, err);
					obs::record_outcome(OPERATION, Outcome::Failure);
				},
			}

			result
		})
	}

	fn login_redirect(&self, request: &TokenRequest) -> Result<Navigation> {
		const OPERATION: Operation = Operation::SignIn;

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let hint = request.account.as_ref().map(login_hint);
		let result = self.start_redirect(NavigationKind::Login, &request.scopes, hint);

		record_redirect(OPERATION, &result);

		result
	}

	fn logout_redirect(&self, account: Option<&Account>) -> Result<Navigation> {
		const OPERATION: Operation = Operation::SignOut;

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let account = account.cloned().or_else(|| self.cache.active_account());
		let mut url = self.authority.logout.clone();

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("post_logout_redirect_uri", self.config.redirect_uri.as_str());

			if let Some(hint) = account.as_ref().and_then(|account| account.login_hint.as_deref())
			{
				pairs.append_pair("logout_hint", hint);
			}
		}

		if let Some(account) = &account {
			self.cache.remove_account(&account.home_account_id);
			self.flow_guards.lock().retain(|key, _| key.account != account.home_account_id);
		}

		let result = Ok(Navigation { kind: NavigationKind::Logout, url });

		record_redirect(OPERATION, &result);

		result
	}

	fn acquire_token_silent<'a>(
		&'a self,
		request: &'a TokenRequest,
	) -> ProviderFuture<'a, AuthenticationResult> {
		const OPERATION: Operation = Operation::AcquireTokenSilent;

		Box::pin(async move {
			let span = OperationSpan::new(OPERATION, "acquire_token_silent");

			obs::record_outcome(OPERATION, Outcome::Attempt);

			let result = span.instrument(self.silent(request)).await;

			match &result {
				Ok(_) => obs::record_outcome(OPERATION, Outcome::Success),
				Err(err) => {
					if err.requires_interaction() {
						obs::debug(OPERATION, err);
					} else {
						obs::warn(OPERATION, err);
					}

					obs::record_outcome(OPERATION, Outcome::Failure);
				},
			}

			result
		})
	}

	fn acquire_token_redirect(&self, request: &TokenRequest) -> Result<Navigation> {
		const OPERATION: Operation = Operation::AcquireTokenRedirect;

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let account = request.account.clone().or_else(|| self.cache.active_account());
		let hint = account.as_ref().map(login_hint);
		let result = self.start_redirect(NavigationKind::AcquireToken, &request.scopes, hint);

		record_redirect(OPERATION, &result);

		result
	}
}
impl<C> Debug for EntraProvider<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EntraProvider")
			.field("authority", &self.authority.base)
			.field("client_id", &self.config.spa_client_id)
			.field("pending_redirects", &self.pending_redirects())
			.finish()
	}
}

#[derive(Debug, Default)]
struct RedirectParams {
	code: Option<String>,
	state: Option<String>,
	error: Option<String>,
	error_description: Option<String>,
}
impl RedirectParams {
	// Query first; the fragment only when the query carries no authorization response.
	fn from_callback(callback: &Url) -> Option<Self> {
		let from_query = Self::parse(callback.query_pairs());

		if from_query.is_response() {
			return Some(from_query);
		}

		let from_fragment = Self::parse(url::form_urlencoded::parse(callback.fragment()?.as_bytes()));

		from_fragment.is_response().then_some(from_fragment)
	}

	fn parse(pairs: url::form_urlencoded::Parse) -> Self {
		let mut params = Self::default();

		for (key, value) in pairs {
			let slot = match key.as_ref() {
				"code" => &mut params.code,
				"state" => &mut params.state,
				"error" => &mut params.error,
				"error_description" => &mut params.error_description,
				_ => continue,
			};

			*slot = Some(value.into_owned());
		}

		params
	}

	fn is_response(&self) -> bool {
		self.code.is_some() || self.state.is_some() || self.error.is_some()
	}
}

fn login_hint(account: &Account) -> &str {
	account.login_hint.as_deref().unwrap_or(&account.username)
}

fn with_oidc_scopes(scopes: &ScopeSet) -> Result<ScopeSet> {
	let oidc = ScopeSet::new(OIDC_REQUEST_SCOPES).map_err(ConfigError::from)?;

	Ok(scopes.union(&oidc))
}

fn build_record(
	account: &Account,
	scope: ScopeSet,
	grant: &TokenGrant,
	previous_refresh: Option<&TokenSecret>,
	now: OffsetDateTime,
) -> Result<TokenRecord> {
	let mut builder = TokenRecord::builder(account.home_account_id.clone(), scope)
		.access_token(grant.access_token.as_str())
		.issued_at(now)
		.expires_in(grant.expires_in);

	// Entra may omit the refresh token on renewal; the previous one stays valid then.
	match (grant.refresh_token.as_deref(), previous_refresh) {
		(Some(rotated), _) => builder = builder.refresh_token(rotated),
		(None, Some(previous)) => builder = builder.refresh_token(previous.expose()),
		(None, None) => {},
	}

	if let Some(id_token) = grant.id_token.as_deref() {
		builder = builder.id_token(id_token);
	}

	builder.build().map_err(|err| match err {
		TokenRecordBuilderError::ExpiryOutOfRange => ConfigError::ExpiresInOutOfRange.into(),
		err => ConfigError::from(err).into(),
	})
}

fn authentication_result(
	account: &Account,
	record: &TokenRecord,
	from_cache: bool,
) -> AuthenticationResult {
	AuthenticationResult {
		access_token: record.access_token.clone(),
		id_token: record.id_token.clone(),
		account: account.clone(),
		scopes: record.scope.clone(),
		expires_at: record.expires_at,
		from_cache,
	}
}

fn record_redirect(operation: Operation, result: &Result<Navigation>) {
	match result {
		Ok(navigation) => {
			obs::debug(operation, &format_args!("redirecting to {}", navigation.url.path()));
			obs::record_outcome(operation, Outcome::Redirect);
		},
		Err(err) => {
			obs::warn(operation, err);
			obs::record_outcome(operation, Outcome::Failure);
		},
	}
}
