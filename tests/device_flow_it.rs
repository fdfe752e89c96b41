mod common;

// crates.io
use parking_lot::Mutex;
// self
use common::*;
use github_pipeline::{
	auth::{
		DeviceCode, DeviceFlowProvider, DeviceFlowStage, DeviceFlowState, PromptFuture,
		StoredCredential, TokenSecret, VerificationPrompt,
	},
	error::AuthError,
	store::{CredentialStore, MemoryStore},
};

const CLIENT_ID: &str = "Iv1.device";
const DEVICE_CODE: &str =
	r#"{"device_code":"dc_1","user_code":"WDJB-MJHT","verification_uri":"https://github.com/login/device","expires_in":900,"interval":5}"#;

#[derive(Clone, Default)]
struct RecordingPrompt(Arc<Mutex<Vec<String>>>);
impl RecordingPrompt {
	fn codes(&self) -> Vec<String> {
		self.0.lock().clone()
	}
}
impl VerificationPrompt for RecordingPrompt {
	fn present<'a>(&'a self, code: &'a DeviceCode) -> PromptFuture<'a> {
		Box::pin(async move {
			self.0.lock().push(code.user_code.clone());

			Ok(())
		})
	}
}

fn pending() -> Step {
	Step::ok(r#"{"error":"authorization_pending"}"#)
}

fn granted(token: &str) -> Step {
	Step::ok(format!(
		r#"{{"access_token":"{token}","token_type":"bearer","scope":"","expires_in":28800,"refresh_token":"ghr_{token}","refresh_token_expires_in":15897600}}"#
	))
}

fn provider(connector: &Arc<ScriptedConnector>, store: &MemoryStore, prompt: &RecordingPrompt) -> DeviceFlowProvider {
	DeviceFlowProvider::builder(CLIENT_ID)
		.web_endpoint("https://github.test")
		.shared_connector(connector.clone())
		.store(store.clone())
		.prompt(prompt.clone())
		.build()
		.expect("Device flow provider should build.")
}

fn body(request: &ConnectorRequest) -> String {
	String::from_utf8(request.body.clone().unwrap_or_default()).expect("Form bodies are UTF-8.")
}

#[tokio::test(start_paused = true)]
async fn approval_after_slow_down_persists_the_credential() {
	let connector = ScriptedConnector::new([
		Step::ok(DEVICE_CODE),
		pending(),
		Step::ok(r#"{"error":"slow_down"}"#),
		granted("ghu_approved"),
	]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let provider = provider(&connector, &store, &prompt);
	let started = tokio::time::Instant::now();
	let credential = provider.credential().await.expect("The user approves.");

	assert_eq!(credential.header.expose(), "token ghu_approved");
	assert_eq!(prompt.codes(), ["WDJB-MJHT"]);
	assert_eq!(connector.attempts(), 4);
	assert!(started.elapsed() >= std::time::Duration::from_secs(20));

	let requests = connector.requests();

	assert_eq!(requests[0].url.path(), "/login/device/code");
	assert_eq!(requests[0].headers.get("accept"), Some("application/json"));
	assert!(body(&requests[1]).contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
	assert!(body(&requests[1]).contains("device_code=dc_1"));

	let stored = store
		.load(CLIENT_ID)
		.await
		.expect("Store load should succeed.")
		.expect("The credential should be persisted.");

	assert_eq!(stored.access_token.expose(), "ghu_approved");
	assert!(stored.can_refresh_at(OffsetDateTime::now_utc()));
}

#[tokio::test(start_paused = true)]
async fn stepping_visits_each_state_once_on_success() {
	let connector =
		ScriptedConnector::new([Step::ok(DEVICE_CODE), pending(), pending(), granted("ghu_steps")]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let provider = provider(&connector, &store, &prompt);
	let mut flow = provider.flow();
	let mut stages = vec![flow.state().stage()];

	while !flow.state().is_terminal() {
		let stage = flow.step().await.expect("Every step should succeed.").stage();

		if stages.last() != Some(&stage) {
			stages.push(stage);
		}
	}

	assert_eq!(
		stages,
		[
			DeviceFlowStage::NotStarted,
			DeviceFlowStage::CodeRequested,
			DeviceFlowStage::PollingForApproval,
			DeviceFlowStage::Authorized,
		],
	);
	assert_eq!(connector.attempts(), 4);
	assert_eq!(
		flow.step().await.expect("Terminal steps are no-ops.").stage(),
		DeviceFlowStage::Authorized,
	);
	assert_eq!(connector.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn denial_and_expiry_end_the_flow() {
	let connector = ScriptedConnector::new([Step::ok(DEVICE_CODE), Step::ok(r#"{"error":"access_denied"}"#)]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let denied = provider(&connector, &store, &prompt).credential().await;

	assert!(matches!(denied, Err(Error::Auth(AuthError::AccessDenied))));

	let connector = ScriptedConnector::new([Step::ok(DEVICE_CODE), Step::ok(r#"{"error":"expired_token"}"#)]);
	let expired = provider(&connector, &store, &prompt).credential().await;

	assert!(matches!(expired, Err(Error::Auth(AuthError::DeviceCodeExpired))));
	assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn local_deadline_expires_without_polling_past_it() {
	let connector = ScriptedConnector::new([
		Step::ok(
			r#"{"device_code":"dc_2","user_code":"ABCD-EFGH","verification_uri":"https://github.com/login/device","expires_in":6,"interval":5}"#,
		),
		pending(),
		pending(),
	]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let result = provider(&connector, &store, &prompt).credential().await;

	assert!(matches!(result, Err(Error::Auth(AuthError::DeviceCodeExpired))));
	assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn out_of_range_code_lifetimes_poll_without_a_deadline() {
	let connector = ScriptedConnector::new([
		Step::ok(
			r#"{"device_code":"dc_3","user_code":"FARF-UTUR","verification_uri":"https://github.com/login/device","expires_in":9223372036854775807,"interval":5}"#,
		),
		granted("ghu_far"),
	]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let provider = provider(&connector, &store, &prompt);
	let mut flow = provider.flow();

	flow.step().await.expect("The code is issued.");

	let polling = flow.step().await.expect("The code is presented.");

	assert!(matches!(polling, DeviceFlowState::PollingForApproval { deadline: None, .. }));
	assert_eq!(
		flow.step().await.expect("The poll is answered.").stage(),
		DeviceFlowStage::Authorized,
	);
}

#[tokio::test]
async fn usable_stored_credentials_skip_the_network() {
	let connector = ScriptedConnector::new(std::iter::empty());
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());

	store
		.save(CLIENT_ID, StoredCredential::bearer(TokenSecret::new("ghu_stored")))
		.await
		.expect("Seeding the store should succeed.");

	let credential = provider(&connector, &store, &prompt).credential().await.expect("Stored token.");

	assert_eq!(credential.header.expose(), "token ghu_stored");
	assert_eq!(connector.attempts(), 0);
	assert!(prompt.codes().is_empty());
}

#[tokio::test]
async fn expired_access_tokens_are_refreshed() {
	let connector = ScriptedConnector::new([Step::ok(
		r#"{"access_token":"ghu_fresh","token_type":"bearer","expires_in":28800}"#,
	)]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let now = OffsetDateTime::now_utc();

	store
		.save(
			CLIENT_ID,
			StoredCredential::bearer(TokenSecret::new("ghu_stale"))
				.with_access_expires_at(now - Duration::minutes(1))
				.with_refresh_token(TokenSecret::new("ghr_keep"))
				.with_refresh_expires_at(now + Duration::days(30)),
		)
		.await
		.expect("Seeding the store should succeed.");

	let credential = provider(&connector, &store, &prompt).credential().await.expect("Refresh.");
	let requests = connector.requests();

	assert_eq!(credential.header.expose(), "token ghu_fresh");
	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].url.path(), "/login/oauth/access_token");
	assert!(body(&requests[0]).contains("grant_type=refresh_token"));
	assert!(body(&requests[0]).contains("refresh_token=ghr_keep"));

	let stored = store.load(CLIENT_ID).await.expect("Store load.").expect("Refreshed credential.");

	assert_eq!(stored.access_token.expose(), "ghu_fresh");
	assert_eq!(stored.refresh_token.as_ref().map(TokenSecret::expose), Some("ghr_keep"));
	assert!(prompt.codes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_refresh_tokens_fall_back_to_a_new_authorization() {
	let connector = ScriptedConnector::new([
		Step::ok(r#"{"error":"bad_refresh_token","error_description":"The refresh token passed is incorrect or expired."}"#),
		Step::ok(DEVICE_CODE),
		granted("ghu_again"),
	]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let now = OffsetDateTime::now_utc();

	store
		.save(
			CLIENT_ID,
			StoredCredential::bearer(TokenSecret::new("ghu_stale"))
				.with_access_expires_at(now - Duration::minutes(1))
				.with_refresh_token(TokenSecret::new("ghr_revoked")),
		)
		.await
		.expect("Seeding the store should succeed.");

	let credential = provider(&connector, &store, &prompt).credential().await.expect("Reauthorized.");

	assert_eq!(credential.header.expose(), "token ghu_again");
	assert_eq!(prompt.codes().len(), 1);
	assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn token_endpoint_errors_are_reported() {
	let connector = ScriptedConnector::new([Step::ok(
		r#"{"error":"device_flow_disabled","error_description":"Device Flow must be explicitly enabled for this App"}"#,
	)]);
	let (store, prompt) = (MemoryStore::default(), RecordingPrompt::default());
	let err = provider(&connector, &store, &prompt).credential().await.expect_err("Flow is disabled.");
	let Error::Auth(AuthError::TokenEndpoint { error, .. }) = &err else {
		panic!("Expected a token endpoint error, got {err:?}.");
	};

	assert_eq!(error, "device_flow_disabled");
}
