//! Environment-driven configuration: tenant, client registrations, redirect URI, and the gateway
//! endpoint under test.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TenantId},
	error::ConfigError,
};

/// Public Entra ID cloud used when no authority host is configured.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Environment variable names read by [`AppConfig::from_env`].
pub mod vars {
	/// Directory (tenant) id or domain.
	pub const TENANT: &str = "ENTRA_TENANT";
	/// Client id of the single-page application registration.
	pub const SPA_CLIENT_ID: &str = "ENTRA_SPA_CLIENT_ID";
	/// Redirect URI registered for the SPA.
	pub const REDIRECT_URI: &str = "ENTRA_REDIRECT_URI";
	/// Client id of the API registration exposing the scope.
	pub const API_APP_CLIENT_ID: &str = "ENTRA_API_APP_CLIENT_ID";
	/// Scope name exposed by the API registration.
	pub const API_SCOPE_NAME: &str = "ENTRA_API_SCOPE_NAME";
	/// Optional authority host override (sovereign clouds, local mocks).
	pub const AUTHORITY_HOST: &str = "ENTRA_AUTHORITY_HOST";
	/// Gateway URL called with the bearer token.
	pub const APIM_URL: &str = "APIM_URL";
	/// Optional APIM subscription key.
	pub const APIM_SUBSCRIPTION_KEY: &str = "APIM_SUBSCRIPTION_KEY";
}

/// Application settings shared by the auth provider and the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
	/// Directory (tenant) id or domain.
	pub tenant: TenantId,
	/// Client id of the single-page application registration.
	pub spa_client_id: String,
	/// Redirect URI registered for the SPA.
	pub redirect_uri: Url,
	/// Client id of the API registration.
	pub api_app_client_id: String,
	/// Scope name exposed by the API registration (e.g. `todos.read`).
	pub api_scope_name: String,
	/// Default gateway URL.
	pub api_url: String,
	/// Default subscription key; `None` when unset or blank.
	pub subscription_key: Option<String>,
	/// Authority host, without the tenant segment.
	pub authority_host: Url,
}
impl AppConfig {
	/// Reads the configuration from process environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through an arbitrary key lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&'static str) -> Option<String>,
	{
		let optional = |name| lookup(name).map(|value| value.trim().to_owned()).filter(|v| !v.is_empty());
		let required = |name| optional(name).ok_or(ConfigError::MissingVar { name });
		let tenant = TenantId::new(required(vars::TENANT)?).map_err(ConfigError::from)?;
		let redirect_uri = parse_url(vars::REDIRECT_URI, &required(vars::REDIRECT_URI)?)?;
		let authority_host = match optional(vars::AUTHORITY_HOST) {
			Some(raw) => parse_url(vars::AUTHORITY_HOST, &raw)?,
			None => parse_url(vars::AUTHORITY_HOST, DEFAULT_AUTHORITY_HOST)?,
		};
		let config = Self {
			tenant,
			spa_client_id: required(vars::SPA_CLIENT_ID)?,
			redirect_uri,
			api_app_client_id: required(vars::API_APP_CLIENT_ID)?,
			api_scope_name: required(vars::API_SCOPE_NAME)?,
			api_url: required(vars::APIM_URL)?,
			subscription_key: optional(vars::APIM_SUBSCRIPTION_KEY),
			authority_host,
		};

		config.authority()?;

		Ok(config)
	}

	/// Full API scope, `api://<api-client-id>/<scope-name>`.
	pub fn api_scope(&self) -> String {
		format!("api://{}/{}", self.api_app_client_id, self.api_scope_name)
	}

	/// Scopes requested at sign-in: OIDC scopes plus the API scope.
	pub fn login_scopes(&self) -> Result<ScopeSet> {
		ScopeSet::new(["openid".to_owned(), "profile".into(), "offline_access".into(), self.api_scope()])
			.map_err(|e| ConfigError::from(e).into())
	}

	/// Tenant-specific authority and its validated endpoints.
	pub fn authority(&self) -> Result<Authority> {
		Authority::new(&self.authority_host, &self.tenant)
	}
}

/// Entra ID v2.0 endpoints for one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
	/// `<host>/<tenant>`.
	pub base: Url,
	/// Authorization endpoint.
	pub authorize: Url,
	/// Token endpoint.
	pub token: Url,
	/// End-session endpoint.
	pub logout: Url,
}
impl Authority {
	/// Builds the endpoint set for `host` + `tenant`.
	pub fn new(host: &Url, tenant: &TenantId) -> Result<Self> {
		let root = host.as_str().trim_end_matches('/');
		let base = parse_url(vars::AUTHORITY_HOST, &format!("{root}/{tenant}"))?;
		let endpoint = |path: &str| parse_url(vars::AUTHORITY_HOST, &format!("{base}/oauth2/v2.0/{path}"));
		let authority = Self {
			authorize: endpoint("authorize")?,
			token: endpoint("token")?,
			logout: endpoint("logout")?,
			base,
		};

		validate_endpoint("authorization", &authority.authorize)?;
		validate_endpoint("token", &authority.token)?;
		validate_endpoint("logout", &authority.logout)?;

		Ok(authority)
	}
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn validate_endpoint(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
