//! Facade over the `oauth2` crate for the two token endpoint grants a public SPA client needs:
//! authorization code (with PKCE) and refresh token.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, Client, ClientId, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	config::Authority,
	error::{ConfigError, INTERACTION_REQUIRED_CODES, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Extra token response fields returned by the Entra v2.0 token endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// OIDC ID token, present when `openid` was requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

type EntraTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type EntraClient<HasAuthUrl = EndpointSet, HasTokenUrl = EndpointSet> = Client<
	BasicErrorResponse,
	EntraTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	HasAuthUrl,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	HasTokenUrl,
>;

/// Token endpoint grant labels used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
	/// `grant_type=authorization_code`.
	AuthorizationCode,
	/// `grant_type=refresh_token`.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 grant identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical categories for token endpoint error responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenErrorKind {
	/// The user has to go through the authorize endpoint again.
	InteractionRequired,
	/// The code or refresh token was rejected.
	InvalidGrant,
	/// The client registration or request shape was rejected.
	InvalidClient,
	/// Temporary failure worth retrying.
	Transient,
}

/// Classifies an OAuth `error` code, falling back to the HTTP status.
pub fn classify_token_error(code: &str, status: Option<u16>) -> TokenErrorKind {
	if INTERACTION_REQUIRED_CODES.contains(&code) {
		return TokenErrorKind::InteractionRequired;
	}

	match code {
		"invalid_grant" | "invalid_scope" => TokenErrorKind::InvalidGrant,
		"invalid_client" | "unauthorized_client" | "invalid_request" | "unsupported_grant_type" =>
			TokenErrorKind::InvalidClient,
		_ => match status {
			Some(401) => TokenErrorKind::InvalidClient,
			Some(400) => TokenErrorKind::InvalidGrant,
			_ => TokenErrorKind::Transient,
		},
	}
}

/// Successful token endpoint response, before it is tied to an account.
#[derive(Clone)]
pub(crate) struct TokenGrant {
	pub(crate) access_token: String,
	pub(crate) refresh_token: Option<String>,
	pub(crate) id_token: Option<String>,
	pub(crate) expires_in: Duration,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("expires_in", &self.expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

pub(crate) struct EntraFacade<C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: EntraClient,
	http_client: Arc<C>,
}
impl<C> EntraFacade<C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn new(
		client_id: &str,
		authority: &Authority,
		redirect_uri: &Url,
		http_client: Arc<C>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(authority.authorize.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "authorize endpoint", source })?;
		let token_url = TokenUrl::new(authority.token.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "token endpoint", source })?;
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "redirect URI", source })?;
		let oauth_client =
			<EntraClient<EndpointNotSet, EndpointNotSet>>::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		Ok(Self { oauth_client, http_client })
	}

	pub(crate) async fn exchange_authorization_code(
		&self,
		code: &str,
		pkce_verifier: &str,
		scope: &ScopeSet,
		redirect_uri: &Url,
	) -> Result<TokenGrant> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { name: "redirect URI", source })?;
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url));

		if !scope.is_empty() {
			request = request.add_extra_param("scope", scope.normalized());
		}

		let response = request.request_async(&instrumented).await.map_err(|err| {
			map_request_error(GrantType::AuthorizationCode, meta.take(), err)
		})?;

		map_token_response(response)
	}

	pub(crate) async fn refresh_token(
		&self,
		refresh_token: &str,
		scope: &ScopeSet,
	) -> Result<TokenGrant> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for value in scope.iter() {
			request = request.add_scope(Scope::new(value.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(GrantType::RefreshToken, meta.take(), err))?;

		map_token_response(response)
	}
}

fn map_token_response(response: EntraTokenResponse) -> Result<TokenGrant> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	Ok(TokenGrant {
		access_token: response.access_token().secret().to_owned(),
		refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
		id_token: response.extra_fields().id_token.clone(),
		expires_in: Duration::seconds(expires_in),
	})
}

fn map_request_error<E>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(grant, response, meta_ref),
		RequestTokenError::Request(error) => map_transport_error(error, meta_ref),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message: format!("{grant} request failed: {message}"),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref().to_owned();
	let reason = response.error_description().cloned().unwrap_or_else(|| code.clone());

	match classify_token_error(&code, meta_status(meta)) {
		TokenErrorKind::InteractionRequired => Error::interaction_required(code, reason),
		TokenErrorKind::InvalidGrant => Error::InvalidGrant { reason },
		TokenErrorKind::InvalidClient => Error::InvalidClient { reason },
		TokenErrorKind::Transient => TransientError::TokenEndpoint {
			message: format!("{grant} request returned {code}: {reason}"),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_transport_error<E>(err: HttpClientError<E>, meta: Option<&ResponseMetadata>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransientError::TokenEndpoint {
			message: format!("HTTP client error: {message}"),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => TransientError::TokenEndpoint {
			message: "HTTP client error occurred while calling the token endpoint".into(),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
