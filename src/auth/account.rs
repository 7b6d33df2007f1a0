//! Signed-in accounts and the ID token claims they are derived from.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{AccountId, IdentifierError, TenantId},
};

/// Errors raised while decoding an ID token payload.
#[derive(Debug, ThisError)]
pub enum IdTokenError {
	/// Token endpoint response carried no ID token.
	#[error("Token endpoint response is missing id_token; request the openid scope.")]
	Missing,
	/// Token does not have the `header.payload.signature` shape.
	#[error("ID token is not a compact JWT.")]
	Malformed,
	/// Payload segment is not base64url.
	#[error("ID token payload is not valid base64url.")]
	Encoding(#[from] base64::DecodeError),
	/// Payload JSON does not match the expected claims.
	#[error("ID token claims are invalid.")]
	Claims(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Claims lack an object identifier.
	#[error("ID token carries neither an oid nor a sub claim.")]
	MissingSubject,
	/// Claims produce an invalid account or tenant identifier.
	#[error("ID token carries an invalid identifier.")]
	Identifier(#[from] IdentifierError),
}

/// Subset of Entra ID token claims used to describe the signed-in account.
///
/// Signatures are not verified; the token is taken straight from the token endpoint response
/// over TLS and only used for display and cache keying.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Object id of the user in the tenant.
	#[serde(default)]
	pub oid: Option<String>,
	/// Subject; pairwise per application.
	#[serde(default)]
	pub sub: Option<String>,
	/// Tenant id.
	#[serde(default)]
	pub tid: Option<String>,
	/// Sign-in name shown to the user.
	#[serde(default)]
	pub preferred_username: Option<String>,
	/// User principal name (v1 tokens).
	#[serde(default)]
	pub upn: Option<String>,
	/// Email address, when released.
	#[serde(default)]
	pub email: Option<String>,
	/// Display name.
	#[serde(default)]
	pub name: Option<String>,
	/// Nonce echoed from the authorize request.
	#[serde(default)]
	pub nonce: Option<String>,
	/// Opaque hint usable for `login_hint`/`logout_hint`.
	#[serde(default)]
	pub login_hint: Option<String>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn decode(id_token: &str) -> Result<Self, IdTokenError> {
		let mut segments = id_token.split('.');
		let (Some(_header), Some(payload), Some(_signature), None) =
			(segments.next(), segments.next(), segments.next(), segments.next())
		else {
			return Err(IdTokenError::Malformed);
		};
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}

	fn object_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref())
	}
}

/// Account signed in through the authorize endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
	/// `<oid>.<tid>` identifier keying the cache.
	pub home_account_id: AccountId,
	/// Object id within the tenant.
	pub local_account_id: String,
	/// Tenant the account signed in to.
	pub tenant_id: TenantId,
	/// Sign-in name.
	pub username: String,
	/// Display name, when released.
	pub name: Option<String>,
	/// Hint forwarded to the authorize and logout endpoints.
	pub login_hint: Option<String>,
}
impl Account {
	/// Builds an account from decoded ID token claims.
	///
	/// `fallback_tenant` is used when the token lacks a `tid` claim.
	pub fn from_claims(claims: &IdTokenClaims, fallback_tenant: &str) -> Result<Self, IdTokenError> {
		let local_account_id = claims.object_id().ok_or(IdTokenError::MissingSubject)?.to_owned();
		let tenant_id = TenantId::new(claims.tid.as_deref().unwrap_or(fallback_tenant))?;
		let home_account_id = AccountId::from_parts(&local_account_id, &tenant_id)?;
		let username = claims
			.preferred_username
			.as_ref()
			.or(claims.upn.as_ref())
			.or(claims.email.as_ref())
			.cloned()
			.unwrap_or_else(|| local_account_id.clone());

		Ok(Self {
			home_account_id,
			local_account_id,
			tenant_id,
			username,
			name: claims.name.clone(),
			login_hint: claims.login_hint.clone(),
		})
	}
}

#[cfg(test)]
pub(crate) fn encode_test_id_token(claims: &serde_json::Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	format!("{header}.{payload}.sig")
}
