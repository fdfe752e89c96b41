//! Installation access tokens exchanged through an app-authenticated client.

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	auth::{AuthFuture, AuthorizationProvider, Credential},
	client::{Client, Request},
	obs::{self, OpKind},
};

/// Boxed future returned by [`InstallationResolver::resolve`].
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<u64>> + 'a + Send>>;

/// Caller-supplied strategy that picks the installation to act as.
pub trait InstallationResolver
where
	Self: Send + Sync,
{
	/// Returns the installation id, using `app_client` (authenticated as the app) for lookups.
	fn resolve<'a>(&'a self, app_client: &'a Client) -> ResolveFuture<'a>;
}

/// How the installation is identified.
#[derive(Clone)]
pub enum InstallationTarget {
	/// Known installation id.
	Id(u64),
	/// Installation on an organization (`GET /orgs/{org}/installation`).
	Organization(String),
	/// Installation on a user account (`GET /users/{user}/installation`).
	User(String),
	/// Installation covering a repository (`GET /repos/{owner}/{repo}/installation`).
	Repository {
		/// Repository owner.
		owner: String,
		/// Repository name.
		repo: String,
	},
	/// Caller-supplied resolver.
	Custom(Arc<dyn InstallationResolver>),
}
impl Debug for InstallationTarget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			InstallationTarget::Id(id) => f.debug_tuple("Id").field(id).finish(),
			InstallationTarget::Organization(org) => f.debug_tuple("Organization").field(org).finish(),
			InstallationTarget::User(user) => f.debug_tuple("User").field(user).finish(),
			InstallationTarget::Repository { owner, repo } =>
				f.debug_struct("Repository").field("owner", owner).field("repo", repo).finish(),
			InstallationTarget::Custom(_) => f.write_str("Custom(..)"),
		}
	}
}

/// Installation metadata returned by the lookup endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Installation {
	/// Installation id.
	pub id: u64,
	/// Owning app id.
	#[serde(default)]
	pub app_id: Option<u64>,
	/// `Organization` or `User`.
	#[serde(default)]
	pub target_type: Option<String>,
	/// Account the app is installed on.
	#[serde(default)]
	pub account: Option<InstallationAccount>,
}

/// Account owning an installation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InstallationAccount {
	/// Account login.
	pub login: String,
}

/// Narrows an installation token to specific repositories or permissions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenScope {
	/// Repository names the token may access.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub repositories: Vec<String>,
	/// Repository ids the token may access.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub repository_ids: Vec<u64>,
	/// Permission name to access level (`read`, `write`, `admin`).
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub permissions: BTreeMap<String, String>,
}

/// Exchanges app credentials for installation tokens and caches them until shortly before expiry.
///
/// The installation id is resolved lazily once and kept for the provider's lifetime. Token
/// refreshes are single-flight: concurrent callers wait for the one exchange in progress.
pub struct InstallationProvider {
	app_client: Client,
	target: InstallationTarget,
	scope: Option<TokenScope>,
	refresh_margin: Duration,
	installation_id: OnceCell<u64>,
	cached: AsyncMutex<Option<Credential>>,
}
impl InstallationProvider {
	/// Default window before expiry in which a new token is exchanged.
	pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);

	/// Creates a provider for `target`; `app_client` must authenticate as the app.
	pub fn new(app_client: Client, target: InstallationTarget) -> Self {
		Self {
			app_client,
			target,
			scope: None,
			refresh_margin: Self::DEFAULT_REFRESH_MARGIN,
			installation_id: OnceCell::new(),
			cached: AsyncMutex::new(None),
		}
	}

	/// Provider for a known installation id.
	pub fn by_id(app_client: Client, installation_id: u64) -> Self {
		Self::new(app_client, InstallationTarget::Id(installation_id))
	}

	/// Provider for the installation on organization `org`.
	pub fn for_organization(app_client: Client, org: impl Into<String>) -> Self {
		Self::new(app_client, InstallationTarget::Organization(org.into()))
	}

	/// Provider for the installation on user account `user`.
	pub fn for_user(app_client: Client, user: impl Into<String>) -> Self {
		Self::new(app_client, InstallationTarget::User(user.into()))
	}

	/// Provider for the installation covering `owner/repo`.
	pub fn for_repository(app_client: Client, owner: impl Into<String>, repo: impl Into<String>) -> Self {
		Self::new(app_client, InstallationTarget::Repository { owner: owner.into(), repo: repo.into() })
	}

	/// Provider whose installation is picked by `resolver`.
	pub fn with_resolver<R>(app_client: Client, resolver: R) -> Self
	where
		R: 'static + InstallationResolver,
	{
		Self::new(app_client, InstallationTarget::Custom(Arc::new(resolver)))
	}

	/// Restricts exchanged tokens to `scope`.
	pub fn with_scope(mut self, scope: TokenScope) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Overrides the window before expiry in which a new token is exchanged.
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin.max(Duration::ZERO);

		self
	}

	/// Installation being acted as.
	pub fn target(&self) -> &InstallationTarget {
		&self.target
	}

	/// Resolved installation id; the first call performs the lookup.
	pub async fn installation_id(&self) -> Result<u64> {
		let id = self.installation_id.get_or_try_init(|| self.resolve_id()).await?;

		Ok(*id)
	}

	async fn resolve_id(&self) -> Result<u64> {
		let path = match &self.target {
			InstallationTarget::Id(id) => return Ok(*id),
			InstallationTarget::Custom(resolver) => return resolver.resolve(&self.app_client).await,
			InstallationTarget::Organization(org) => format!("/orgs/{org}/installation"),
			InstallationTarget::User(user) => format!("/users/{user}/installation"),
			InstallationTarget::Repository { owner, repo } =>
				format!("/repos/{owner}/{repo}/installation"),
		};

		obs::observe(OpKind::InstallationLookup, "lookup", async {
			let installation: Installation = self.app_client.fetch_json(Request::get(path)).await?;

			Ok(installation.id)
		})
		.await
	}

	/// Fetches `GET /app/installations/{id}` for the resolved installation.
	pub async fn installation(&self) -> Result<Installation> {
		let id = self.installation_id().await?;

		self.app_client.fetch_json(Request::get(format!("/app/installations/{id}"))).await
	}

	/// Returns the cached token, exchanging a new one once the current one nears expiry.
	pub async fn credential(&self) -> Result<Credential> {
		let mut cached = self.cached.lock().await;

		if let Some(credential) = cached.as_ref().filter(|c| c.is_usable(self.refresh_margin)) {
			return Ok(credential.clone());
		}

		let credential = obs::observe(OpKind::InstallationToken, "exchange", self.exchange()).await?;

		obs::record_credential_refresh(
			OpKind::InstallationToken,
			&credential.header.fingerprint(),
			credential.expires_at,
		);
		*cached = Some(credential.clone());

		Ok(credential)
	}

	async fn exchange(&self) -> Result<Credential> {
		let id = self.installation_id().await?;
		let request = Request::post(format!("/app/installations/{id}/access_tokens"));
		let request = match &self.scope {
			Some(scope) => request.with_json_body(scope)?,
			None => request,
		};
		let token: InstallationToken = self.app_client.fetch_json(request).await?;

		Ok(Credential::expiring(format!("token {}", token.token), token.expires_at))
	}
}
impl AuthorizationProvider for InstallationProvider {
	fn authorization_header<'a>(&'a self, _target: Option<&'a Url>) -> AuthFuture<'a> {
		Box::pin(async move { Ok(Some(self.credential().await?.header.expose().to_owned())) })
	}
}
impl Debug for InstallationProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InstallationProvider")
			.field("target", &self.target)
			.field("scope", &self.scope)
			.field("refresh_margin", &self.refresh_margin)
			.field("installation_id", &self.installation_id.get())
			.finish_non_exhaustive()
	}
}

#[derive(Deserialize)]
struct InstallationToken {
	token: String,
	#[serde(with = "time::serde::rfc3339")]
	expires_at: OffsetDateTime,
}
