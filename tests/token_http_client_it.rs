// std
use std::{
	collections::HashMap,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use parking_lot::Mutex;
use time::Duration;
// self
use entra_apim_probe::{
	auth::{Account, AccountId, TenantId, TokenRecord},
	config::{AppConfig, vars},
	error::{Error, Result, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
	},
	provider::{AuthProvider, EntraProvider, TokenRequest},
};

#[derive(Debug)]
struct FakeTransportError;
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Connection reset.")
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Copy)]
enum Behavior {
	Throttled(Duration),
	Unreachable,
}

#[derive(Clone)]
struct FakeHttpClient {
	behavior: Behavior,
	requests: Arc<Mutex<Vec<String>>>,
}
impl FakeHttpClient {
	fn new(behavior: Behavior) -> Self {
		Self { behavior, requests: Default::default() }
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHttpHandle { slot, behavior: self.behavior, requests: self.requests.clone() }
	}
}

struct FakeHttpHandle {
	slot: ResponseMetadataSlot,
	behavior: Behavior,
	requests: Arc<Mutex<Vec<String>>>,
}
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let behavior = self.behavior;

		self.requests.lock().push(String::from_utf8_lossy(request.body()).into_owned());

		Box::pin(async move {
			assert!(
				slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);

			match behavior {
				Behavior::Throttled(retry_after) => {
					slot.store(ResponseMetadata {
						status: Some(429),
						retry_after: Some(retry_after),
					});

					let mut response = HttpResponse::new(
						br#"{"error":"temporarily_unavailable","error_description":"Try later"}"#
							.to_vec(),
					);

					*response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
					response
						.headers_mut()
						.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

					Ok(response)
				},
				Behavior::Unreachable => Err(HttpClientError::Reqwest(Box::new(FakeTransportError))),
			}
		})
	}
}

fn build_provider(http_client: FakeHttpClient) -> EntraProvider<FakeHttpClient> {
	let values = HashMap::from([
		(vars::TENANT, "contoso"),
		(vars::SPA_CLIENT_ID, "spa-client"),
		(vars::REDIRECT_URI, "http://localhost:5173"),
		(vars::API_APP_CLIENT_ID, "api-client"),
		(vars::API_SCOPE_NAME, "todos.read"),
		(vars::APIM_URL, "https://gateway.example.com/todos"),
	]);
	let config = AppConfig::from_lookup(move |name| values.get(name).map(|v| v.to_string()))
		.expect("Config fixture should load.");

	EntraProvider::with_http_client(config, Arc::new(http_client))
		.expect("Provider should build with the fake transport.")
}

/// Seeds an account whose access token is about to expire.
fn seed_expiring_session(provider: &EntraProvider<FakeHttpClient>) -> TokenRequest {
	let account = Account {
		home_account_id: AccountId::from_parts("oid-1", "tid-1").expect("Account id fixture."),
		local_account_id: "oid-1".into(),
		tenant_id: TenantId::new("tid-1").expect("Tenant id fixture."),
		username: "ada@contoso.com".into(),
		name: None,
		login_hint: None,
	};
	let request = TokenRequest::new(
		provider.config().login_scopes().expect("Login scopes should build for the test."),
	);
	let record = TokenRecord::builder(
		account.home_account_id.clone(),
		request.scopes.resource_scopes(),
	)
	.access_token("access-old")
	.refresh_token("refresh-old")
	.expires_in(Duration::seconds(30))
	.build()
	.expect("Record fixture should build.");

	provider.cache().save_record(record);
	provider.set_active_account(Some(account));

	request
}

#[tokio::test]
async fn throttled_refresh_surfaces_status_and_retry_after() {
	let http_client = FakeHttpClient::new(Behavior::Throttled(Duration::seconds(5)));
	let provider = build_provider(http_client.clone());
	let request = seed_expiring_session(&provider);
	let err = provider
		.acquire_token_silent(&request)
		.await
		.expect_err("Throttled refresh should fail.");

	match err {
		Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
			assert_eq!(status, Some(429));
			assert_eq!(retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	let requests = http_client.requests.lock().clone();

	assert_eq!(requests.len(), 1, "Exactly one token request must be sent.");
	assert!(requests[0].contains("grant_type=refresh_token"));
	assert!(requests[0].contains("refresh_token=refresh-old"));
	// Transient failures keep the cached record for a later retry.
	assert!(
		provider
			.cache()
			.fetch_record(
				&provider.active_account().expect("Account stays active.").home_account_id,
				&request.scopes.resource_scopes(),
			)
			.is_some()
	);
}

#[tokio::test]
async fn transport_failures_map_to_network_errors() {
	let provider = build_provider(FakeHttpClient::new(Behavior::Unreachable));
	let request = seed_expiring_session(&provider);
	let err = provider
		.acquire_token_silent(&request)
		.await
		.expect_err("Unreachable token endpoint should fail.");

	assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	assert!(!err.requires_interaction());
}
