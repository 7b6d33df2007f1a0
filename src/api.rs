//! Bearer-authenticated calls to the API Management gateway.

// crates.io
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	obs::{self, Operation, OperationSpan, Outcome},
};

/// Header carrying the APIM product subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Status and body of a gateway response, exactly as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body decoded as text.
	pub text: String,
}
impl Display for ApiResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "HTTP {}\n{}", self.status, self.text)
	}
}

/// Thin reqwest wrapper issuing the gateway GET.
#[derive(Clone, Debug, Default)]
pub struct ApiClient(ReqwestClient);
impl ApiClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Sends `GET url` with the bearer token and, when non-empty, the subscription key.
	///
	/// Any status code is a successful call; only transport failures are errors.
	pub async fn call(
		&self,
		access_token: &str,
		url: &str,
		subscription_key: Option<&str>,
	) -> Result<ApiResponse> {
		const OPERATION: Operation = Operation::CallApi;

		let span = OperationSpan::new(OPERATION, "call");

		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span.instrument(self.send(access_token, url, subscription_key)).await;

		match &result {
			Ok(response) => {
				obs::debug(OPERATION, &format_args!("gateway answered {}", response.status));
				obs::record_outcome(OPERATION, Outcome::Success);
			},
			Err(err) => {
				obs::error(OPERATION, err);
				obs::record_outcome(OPERATION, Outcome::Failure);
			},
		}

		result
	}

	async fn send(
		&self,
		access_token: &str,
		url: &str,
		subscription_key: Option<&str>,
	) -> Result<ApiResponse> {
		let url = Url::parse(url)
			.map_err(|source| ConfigError::InvalidUrl { name: "API URL", source })?;
		let mut request = self
			.0
			.get(url)
			.header(AUTHORIZATION, format!("Bearer {access_token}"))
			.header(CONTENT_TYPE, "application/json");

		if let Some(key) = subscription_key.filter(|key| !key.is_empty()) {
			request = request.header(SUBSCRIPTION_KEY_HEADER, key);
		}

		let response = request.send().await.map_err(TransportError::from)?;
		let status = response.status().as_u16();
		let text = response.text().await.map_err(TransportError::from)?;

		Ok(ApiResponse { status, text })
	}
}
