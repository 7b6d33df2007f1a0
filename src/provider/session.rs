//! Authorization code + PKCE session bookkeeping for redirects in flight.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ScopeSet, provider::NavigationKind};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`AuthorizationSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Redirect in flight, kept until the authorization response comes back.
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Why the redirect was started.
	pub kind: NavigationKind,
	/// Scopes sent to the authorize endpoint.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip via the redirect.
	pub state: String,
	/// Nonce the returned ID token must echo.
	pub nonce: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL.
	pub authorize_url: Url,
	pkce: PkcePair,
}
impl AuthorizationSession {
	/// Starts a session and builds its authorize URL.
	pub fn start(
		kind: NavigationKind,
		authorize_endpoint: &Url,
		client_id: &str,
		redirect_uri: &Url,
		scope: ScopeSet,
		login_hint: Option<&str>,
	) -> Self {
		let state = random_string(STATE_LEN);
		let nonce = random_string(NONCE_LEN);
		let pkce = PkcePair::generate();
		let mut authorize_url = authorize_endpoint.clone();
		let mut pairs = authorize_url.query_pairs_mut();

		pairs.append_pair("client_id", client_id);
		pairs.append_pair("response_type", "code");
		pairs.append_pair("redirect_uri", redirect_uri.as_str());
		pairs.append_pair("response_mode", "query");

		if !scope.is_empty() {
			pairs.append_pair("scope", &scope.normalized());
		}

		pairs.append_pair("state", &state);
		pairs.append_pair("nonce", &nonce);
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());

		if let Some(hint) = login_hint {
			pairs.append_pair("login_hint", hint);
		}

		drop(pairs);

		Self { kind, scope, state, nonce, redirect_uri: redirect_uri.clone(), authorize_url, pkce }
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Validates the `nonce` claim of the ID token returned for this session.
	pub fn validate_nonce(&self, returned_nonce: Option<&str>) -> Result<()> {
		if returned_nonce == Some(self.nonce.as_str()) {
			Ok(())
		} else {
			Err(Error::InvalidGrant { reason: "ID token nonce mismatch".into() })
		}
	}

	pub(crate) fn pkce_verifier(&self) -> &str {
		&self.pkce.verifier
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("kind", &self.kind)
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}
