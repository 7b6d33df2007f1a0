// crates.io
use httpmock::prelude::*;
// self
use entra_apim_probe::{
	api::{ApiClient, ApiResponse, SUBSCRIPTION_KEY_HEADER},
	error::Error,
	reqwest::Client,
};

/// Accepts the self-signed certificates served by `httpmock`.
fn mock_tls_client() -> ApiClient {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("TLS-relaxed client should build.");

	ApiClient::with_client(client)
}

#[tokio::test]
async fn call_sends_bearer_and_subscription_key() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/todos")
				.header("authorization", "Bearer access-1")
				.header("content-type", "application/json")
				.header(SUBSCRIPTION_KEY_HEADER, "key-1");
			then.status(200).body("[{\"id\":1}]");
		})
		.await;
	let response = mock_tls_client()
		.call("access-1", &server.url("/todos"), Some("key-1"))
		.await
		.expect("Gateway call should succeed.");

	mock.assert_async().await;

	assert_eq!(response, ApiResponse { status: 200, text: "[{\"id\":1}]".into() });
}

#[tokio::test]
async fn error_statuses_are_returned_verbatim() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/todos");
			then.status(401).body("{ \"statusCode\": 401, \"message\": \"Invalid JWT.\" }");
		})
		.await;
	let response = mock_tls_client()
		.call("expired", &server.url("/todos"), None)
		.await
		.expect("Non-2xx statuses are not transport errors.");

	mock.assert_async().await;

	assert_eq!(response.status, 401);
	assert_eq!(response.text, "{ \"statusCode\": 401, \"message\": \"Invalid JWT.\" }");
	assert_eq!(
		response.to_string(),
		"HTTP 401\n{ \"statusCode\": 401, \"message\": \"Invalid JWT.\" }"
	);
}

#[tokio::test]
async fn empty_subscription_key_is_not_sent() {
	let server = MockServer::start_async().await;

	for key in [None, Some("")] {
		let mut mock = server
			.mock_async(|when, then| {
				when.method(GET)
					.path("/todos")
					.header_exists("authorization")
					.header_missing(SUBSCRIPTION_KEY_HEADER);
				then.status(204);
			})
			.await;
		let response = mock_tls_client()
			.call("access-1", &server.url("/todos"), key)
			.await
			.expect("Gateway call should succeed.");

		mock.assert_async().await;
		mock.delete_async().await;

		assert_eq!(response.status, 204);
		assert!(response.text.is_empty());
	}
}

#[tokio::test]
async fn subscription_key_is_sent_as_typed() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/todos").header_exists(SUBSCRIPTION_KEY_HEADER);
			then.status(200);
		})
		.await;
	let response = mock_tls_client()
		.call("access-1", &server.url("/todos"), Some("   "))
		.await
		.expect("Gateway call should succeed.");

	mock.assert_async().await;

	assert_eq!(response.status, 200);
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
	let err = ApiClient::default()
		.call("access-1", "http://127.0.0.1:1/todos", None)
		.await
		.expect_err("Closed ports must fail.");

	assert!(matches!(err, Error::Transport(_)));
}
