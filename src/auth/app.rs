//! App authentication with RS256-signed assertions.

// std
use std::path::PathBuf;
// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use ring::{
	rand::SystemRandom,
	signature::{RSA_PKCS1_SHA256, RsaKeyPair},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthFuture, AuthorizationProvider, Credential},
	error::AuthError,
	obs::{self, OpKind},
	runtime,
};

const JWT_HEADER: &str = r#"{"alg":"RS256","typ":"JWT"}"#;

/// Signs short-lived app assertions and caches each one until shortly before it expires.
pub struct AppProvider {
	app_id: String,
	key: RsaKeyPair,
	rng: SystemRandom,
	validity: Duration,
	refresh_margin: Duration,
	cached: Mutex<Option<Credential>>,
}
impl AppProvider {
	/// Back-dating applied to `iat` to absorb clock drift between client and server.
	pub const CLOCK_DRIFT: Duration = Duration::seconds(60);
	/// Default assertion lifetime.
	pub const DEFAULT_VALIDITY: Duration = Duration::minutes(5);
	/// Default window before expiry in which a new assertion is signed.
	pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(1);

	/// Starts a builder for the app identified by `app_id` (numeric id or client id).
	pub fn builder(app_id: impl Into<String>) -> AppProviderBuilder {
		AppProviderBuilder {
			app_id: app_id.into(),
			key: None,
			validity: Self::DEFAULT_VALIDITY,
			refresh_margin: Self::DEFAULT_REFRESH_MARGIN,
		}
	}

	/// App identifier placed in the `iss` claim.
	pub fn app_id(&self) -> &str {
		&self.app_id
	}

	/// Returns the cached assertion, signing a new one once the current one nears expiry.
	pub fn credential(&self) -> Result<Credential> {
		let mut cached = self.cached.lock();

		if let Some(credential) = cached.as_ref().filter(|c| c.is_usable(self.refresh_margin)) {
			return Ok(credential.clone());
		}

		let credential =
			obs::observe_sync(OpKind::AppAssertion, "sign", || self.sign(runtime::now()))?;

		obs::record_credential_refresh(
			OpKind::AppAssertion,
			&credential.header.fingerprint(),
			credential.expires_at,
		);
		*cached = Some(credential.clone());

		Ok(credential)
	}

	fn sign(&self, now: OffsetDateTime) -> Result<Credential> {
		let expires_at = now + self.validity;
		let claims = Claims {
			iat: (now - Self::CLOCK_DRIFT).unix_timestamp(),
			exp: expires_at.unix_timestamp(),
			iss: &self.app_id,
		};
		let claims = serde_json::to_vec(&claims).map_err(|_| AuthError::Signing)?;
		let message =
			format!("{}.{}", URL_SAFE_NO_PAD.encode(JWT_HEADER), URL_SAFE_NO_PAD.encode(claims));
		let mut signature = vec![0; self.key.public().modulus_len()];

		self.key
			.sign(&RSA_PKCS1_SHA256, &self.rng, message.as_bytes(), &mut signature)
			.map_err(|_| AuthError::Signing)?;

		Ok(Credential::expiring(
			format!("Bearer {message}.{}", URL_SAFE_NO_PAD.encode(signature)),
			// Whole seconds, matching the `exp` claim.
			expires_at.replace_nanosecond(0).unwrap_or(expires_at),
		))
	}
}
impl AuthorizationProvider for AppProvider {
	fn authorization_header<'a>(&'a self, _target: Option<&'a Url>) -> AuthFuture<'a> {
		Box::pin(async move { Ok(Some(self.credential()?.header.expose().to_owned())) })
	}
}
impl Debug for AppProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppProvider")
			.field("app_id", &self.app_id)
			.field("key", &"<redacted>")
			.field("validity", &self.validity)
			.field("refresh_margin", &self.refresh_margin)
			.finish_non_exhaustive()
	}
}

/// Builder for [`AppProvider`].
#[derive(Clone, Debug)]
pub struct AppProviderBuilder {
	app_id: String,
	key: Option<KeySource>,
	validity: Duration,
	refresh_margin: Duration,
}
impl AppProviderBuilder {
	/// Uses a PEM-encoded RSA key (PKCS#1 `RSA PRIVATE KEY` or PKCS#8 `PRIVATE KEY`).
	pub fn private_key_pem(mut self, pem: impl Into<String>) -> Self {
		self.key = Some(KeySource::Pem(pem.into()));

		self
	}

	/// Reads the PEM-encoded RSA key from `path` when building.
	pub fn private_key_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.key = Some(KeySource::File(path.into()));

		self
	}

	/// Overrides the assertion lifetime; GitHub rejects lifetimes above ten minutes.
	pub fn validity(mut self, validity: Duration) -> Self {
		self.validity = validity.clamp(Duration::minutes(1), Duration::minutes(10));

		self
	}

	/// Overrides the window before expiry in which a new assertion is signed.
	pub fn refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin.max(Duration::ZERO);

		self
	}

	/// Loads the key and produces the provider.
	pub fn build(self) -> Result<AppProvider> {
		let pem = match self.key {
			Some(KeySource::Pem(pem)) => pem,
			Some(KeySource::File(path)) => std::fs::read_to_string(&path)
				.map_err(|source| AuthError::KeyFile { path: path.display().to_string(), source })?,
			None =>
				return Err(AuthError::InvalidPrivateKey { reason: "no private key supplied".into() }
					.into()),
		};
		let key = parse_pem(&pem)?;

		Ok(AppProvider {
			app_id: self.app_id,
			key,
			rng: SystemRandom::new(),
			validity: self.validity,
			refresh_margin: self.refresh_margin.min(self.validity),
			cached: Mutex::new(None),
		})
	}
}

#[derive(Clone)]
enum KeySource {
	Pem(String),
	File(PathBuf),
}
impl Debug for KeySource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			KeySource::Pem(_) => f.write_str("Pem(<redacted>)"),
			KeySource::File(path) => f.debug_tuple("File").field(path).finish(),
		}
	}
}

#[derive(Serialize)]
struct Claims<'a> {
	iat: i64,
	exp: i64,
	iss: &'a str,
}

fn parse_pem(pem: &str) -> Result<RsaKeyPair, AuthError> {
	let mut label = None;
	let mut body = String::new();

	for line in pem.lines().map(str::trim) {
		if let Some(rest) = line.strip_prefix("-----BEGIN ") {
			label = rest.strip_suffix("-----").map(str::to_owned);
		} else if line.starts_with("-----END ") {
			break;
		} else if label.is_some() {
			body.push_str(line);
		}
	}

	let der = STANDARD
		.decode(body)
		.map_err(|e| AuthError::InvalidPrivateKey { reason: format!("invalid base64 ({e})") })?;
	let parsed = match label.as_deref() {
		Some("RSA PRIVATE KEY") => RsaKeyPair::from_der(&der),
		Some("PRIVATE KEY") => RsaKeyPair::from_pkcs8(&der),
		Some(other) =>
			return Err(AuthError::InvalidPrivateKey { reason: format!("unsupported PEM label `{other}`") }),
		None => return Err(AuthError::InvalidPrivateKey { reason: "missing PEM header".into() }),
	};

	parsed.map_err(|e| AuthError::InvalidPrivateKey { reason: e.to_string() })
}

#[cfg(test)]
mod tests {
	// crates.io
	use ring::signature::{KeyPair, RSA_PKCS1_2048_8192_SHA256, UnparsedPublicKey};
	// self
	use super::*;

	const PKCS1: &str = include_str!("../../tests/fixtures/app_key_pkcs1.pem");
	const PKCS8: &str = include_str!("../../tests/fixtures/app_key_pkcs8.pem");

	fn decode_segment(segment: &str) -> serde_json::Value {
		let bytes = URL_SAFE_NO_PAD.decode(segment).expect("Segment should be base64url.");

		serde_json::from_slice(&bytes).expect("Segment should be JSON.")
	}

	#[test]
	fn assertions_are_signed_and_backdated() {
		let provider = AppProvider::builder("12345")
			.private_key_pem(PKCS1)
			.build()
			.expect("PKCS#1 key should load.");
		let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("Valid fixture time.");
		let credential = provider.sign(now).expect("Signing should succeed.");
		let jwt = credential.header.expose().strip_prefix("Bearer ").expect("Bearer prefix.");
		let parts = jwt.split('.').collect::<Vec<_>>();

		assert_eq!(parts.len(), 3);
		assert_eq!(decode_segment(parts[0])["alg"], "RS256");

		let claims = decode_segment(parts[1]);

		assert_eq!(claims["iss"], "12345");
		assert_eq!(claims["iat"], 1_700_000_000 - 60);
		assert_eq!(claims["exp"], 1_700_000_000 + 300);
		assert_eq!(credential.expires_at.map(|at| at.unix_timestamp()), Some(1_700_000_300));

		let signature = URL_SAFE_NO_PAD.decode(parts[2]).expect("Signature should be base64url.");
		let public = UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, provider.key.public_key().as_ref());

		public
			.verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
			.expect("Signature should verify against the key's public half.");
	}

	#[test]
	fn cached_assertion_is_reused_within_the_window() {
		let provider = AppProvider::builder("Iv1.abc")
			.private_key_pem(PKCS8)
			.build()
			.expect("PKCS#8 key should load.");
		let first = provider.credential().expect("First assertion.");
		let second = provider.credential().expect("Second assertion.");

		assert_eq!(first, second);
	}

	#[test]
	fn assertion_is_resigned_inside_the_refresh_margin() {
		let provider = AppProvider::builder("1")
			.private_key_pem(PKCS1)
			.validity(Duration::minutes(1))
			.refresh_margin(Duration::minutes(2))
			.build()
			.expect("Key should load.");

		*provider.cached.lock() =
			Some(Credential::expiring("Bearer stale", runtime::now() + Duration::seconds(30)));

		let fresh = provider.credential().expect("Fresh assertion.");

		assert_ne!(fresh.header.expose(), "Bearer stale");
	}

	#[test]
	fn bad_keys_are_rejected() {
		let garbage = AppProvider::builder("1").private_key_pem("not a key").build();
		let missing = AppProvider::builder("1").private_key_file("/nonexistent/key.pem").build();

		assert!(matches!(garbage, Err(Error::Auth(AuthError::InvalidPrivateKey { .. }))));
		assert!(matches!(missing, Err(Error::Auth(AuthError::KeyFile { .. }))));
	}
}
