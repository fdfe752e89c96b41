//! Explicit state machine driving one device authorization.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::{DeviceAuthorizer, DeviceCode, PollOutcome, StoredCredential, VerificationPrompt},
	error::AuthError,
	runtime,
};

/// Extra wait added to the polling interval on every `slow_down` answer without one.
pub const SLOW_DOWN_STEP: Duration = Duration::seconds(5);

/// Where a device authorization currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceFlowState {
	/// No code has been requested yet.
	NotStarted,
	/// A code was issued but not yet shown to the user.
	CodeRequested(DeviceCode),
	/// The user has the code; the token endpoint is being polled.
	PollingForApproval {
		/// Issued code.
		code: DeviceCode,
		/// Current wait between polls.
		interval: Duration,
		/// Instant after which the code is no longer accepted; `None` when the advertised
		/// lifetime lies beyond the monotonic clock's range.
		deadline: Option<Instant>,
	},
	/// The user approved; terminal.
	Authorized(StoredCredential),
	/// The user declined; terminal.
	Denied,
	/// The code expired before approval; terminal.
	Expired,
}
impl DeviceFlowState {
	/// Label of the state without its payload.
	pub fn stage(&self) -> DeviceFlowStage {
		match self {
			DeviceFlowState::NotStarted => DeviceFlowStage::NotStarted,
			DeviceFlowState::CodeRequested(_) => DeviceFlowStage::CodeRequested,
			DeviceFlowState::PollingForApproval { .. } => DeviceFlowStage::PollingForApproval,
			DeviceFlowState::Authorized(_) => DeviceFlowStage::Authorized,
			DeviceFlowState::Denied => DeviceFlowStage::Denied,
			DeviceFlowState::Expired => DeviceFlowStage::Expired,
		}
	}

	/// Returns `true` once no further step changes the state.
	pub fn is_terminal(&self) -> bool {
		matches!(self, DeviceFlowState::Authorized(_) | DeviceFlowState::Denied | DeviceFlowState::Expired)
	}
}

/// Payload-free label of a [`DeviceFlowState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFlowStage {
	/// [`DeviceFlowState::NotStarted`].
	NotStarted,
	/// [`DeviceFlowState::CodeRequested`].
	CodeRequested,
	/// [`DeviceFlowState::PollingForApproval`].
	PollingForApproval,
	/// [`DeviceFlowState::Authorized`].
	Authorized,
	/// [`DeviceFlowState::Denied`].
	Denied,
	/// [`DeviceFlowState::Expired`].
	Expired,
}
impl DeviceFlowStage {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			DeviceFlowStage::NotStarted => "not_started",
			DeviceFlowStage::CodeRequested => "code_requested",
			DeviceFlowStage::PollingForApproval => "polling_for_approval",
			DeviceFlowStage::Authorized => "authorized",
			DeviceFlowStage::Denied => "denied",
			DeviceFlowStage::Expired => "expired",
		}
	}
}
impl Display for DeviceFlowStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Drives a [`DeviceFlowState`] one transition at a time.
///
/// A failed step (transport error, prompt error) leaves the state untouched so the caller may
/// retry the same step.
pub struct DeviceFlow<'a> {
	authorizer: &'a DeviceAuthorizer,
	prompt: &'a dyn VerificationPrompt,
	state: DeviceFlowState,
}
impl<'a> DeviceFlow<'a> {
	/// Starts a flow in [`DeviceFlowState::NotStarted`].
	pub fn new(authorizer: &'a DeviceAuthorizer, prompt: &'a dyn VerificationPrompt) -> Self {
		Self { authorizer, prompt, state: DeviceFlowState::NotStarted }
	}

	/// Current state.
	pub fn state(&self) -> &DeviceFlowState {
		&self.state
	}

	/// Performs one transition and returns the new state; terminal states are left as is.
	pub async fn step(&mut self) -> Result<&DeviceFlowState> {
		let next = match &self.state {
			DeviceFlowState::NotStarted =>
				DeviceFlowState::CodeRequested(self.authorizer.request_code().await?),
			DeviceFlowState::CodeRequested(code) => {
				self.prompt.present(code).await?;

				DeviceFlowState::PollingForApproval {
					code: code.clone(),
					interval: code.poll_interval(),
					deadline: Instant::now().checked_add(std_duration(code.lifetime())),
				}
			},
			DeviceFlowState::PollingForApproval { code, interval, deadline } => {
				let (code, interval, deadline) = (code.clone(), *interval, *deadline);

				self.poll_once(code, interval, deadline).await?
			},
			_ => return Ok(&self.state),
		};

		self.state = next;

		Ok(&self.state)
	}

	/// Steps until a terminal state and converts it into the approved credential.
	pub async fn run(mut self) -> Result<StoredCredential> {
		while !self.state.is_terminal() {
			self.step().await?;
		}

		match self.state {
			DeviceFlowState::Authorized(credential) => Ok(credential),
			DeviceFlowState::Denied => Err(AuthError::AccessDenied.into()),
			_ => Err(AuthError::DeviceCodeExpired.into()),
		}
	}

	async fn poll_once(
		&self,
		code: DeviceCode,
		interval: Duration,
		deadline: Option<Instant>,
	) -> Result<DeviceFlowState> {
		let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);

		if expired() {
			return Ok(DeviceFlowState::Expired);
		}

		runtime::sleep(interval).await;

		if expired() {
			return Ok(DeviceFlowState::Expired);
		}

		Ok(match self.authorizer.poll(&code).await? {
			PollOutcome::Pending => DeviceFlowState::PollingForApproval { code, interval, deadline },
			PollOutcome::SlowDown(server_interval) => DeviceFlowState::PollingForApproval {
				code,
				interval: server_interval.unwrap_or(interval.saturating_add(SLOW_DOWN_STEP)),
				deadline,
			},
			PollOutcome::Authorized(credential) => DeviceFlowState::Authorized(credential),
			PollOutcome::Denied => DeviceFlowState::Denied,
			PollOutcome::Expired => DeviceFlowState::Expired,
		})
	}
}
impl Debug for DeviceFlow<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceFlow").field("state", &self.state).finish_non_exhaustive()
	}
}

fn std_duration(duration: Duration) -> std::time::Duration {
	std::time::Duration::try_from(duration).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TokenSecret;

	fn code() -> DeviceCode {
		DeviceCode {
			device_code: TokenSecret::new("dc"),
			user_code: "WDJB-MJHT".into(),
			verification_uri: "https://github.com/login/device".into(),
			expires_in: 900,
			interval: 5,
		}
	}

	#[test]
	fn only_outcome_states_are_terminal() {
		let polling = DeviceFlowState::PollingForApproval {
			code: code(),
			interval: Duration::seconds(5),
			deadline: Some(Instant::now()),
		};

		assert!(!DeviceFlowState::NotStarted.is_terminal());
		assert!(!DeviceFlowState::CodeRequested(code()).is_terminal());
		assert!(!polling.is_terminal());
		assert!(DeviceFlowState::Denied.is_terminal());
		assert!(DeviceFlowState::Expired.is_terminal());
		assert!(
			DeviceFlowState::Authorized(StoredCredential::bearer(TokenSecret::new("ghu_a"))).is_terminal()
		);
		assert_eq!(polling.stage().as_str(), "polling_for_approval");
	}
}
