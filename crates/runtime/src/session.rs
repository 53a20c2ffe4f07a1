//! Session lifecycle controller.
//!
//! Owns the single native session and enforces the state machine
//! `Created -> Running <-> Paused -> Closed`. Other components only reach the
//! native session through [`SessionController::running_mut`] or
//! [`SessionController::live_mut`], both of which fail once the session is
//! closed, so no caller can observe a released handle.

use ar_protocol::SessionState;
use tracing::{debug, info, trace, warn};

use crate::capability::{NativeSession, SessionConfig, TrackingCapability};
use crate::error::{Error, Result};

pub struct SessionController {
	capability: Box<dyn TrackingCapability>,
	config: SessionConfig,
	session: Option<Box<NativeSession>>,
	state: SessionState,
	/// Set by `start()`, cleared by `stop()`; a background pause keeps it so
	/// the foreground transition knows to resume.
	resume_on_foreground: bool,
}

impl SessionController {
	pub fn new(capability: Box<dyn TrackingCapability>) -> Self {
		Self {
			capability,
			config: SessionConfig::default(),
			session: None,
			state: SessionState::Created,
			resume_on_foreground: false,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn is_running(&self) -> bool {
		self.state == SessionState::Running
	}

	/// `Created|Paused -> Running`, constructing the native session on first use.
	pub fn start(&mut self) -> Result<()> {
		match self.state {
			SessionState::Closed => return Err(Error::SessionClosed),
			SessionState::Running => {
				trace!(target = "ar.session", "start ignored; already running");
				return Ok(());
			}
			SessionState::Created | SessionState::Paused => {}
		}

		if self.session.is_none() {
			let created = self.capability.create_session(&self.config).map_err(|err| {
				warn!(target = "ar.session", error = %err, "session construction failed");
				Error::SessionInit(err.to_string())
			})?;
			debug!(target = "ar.session", config = ?self.config, "native session created");
			self.session = Some(created);
		}
		let Some(session) = self.session.as_mut() else {
			return Err(Error::SessionNotStarted);
		};

		session.resume().map_err(|err| {
			warn!(target = "ar.session", error = %err, "session resume failed during start");
			Error::SessionInit(err.to_string())
		})?;

		self.state = SessionState::Running;
		self.resume_on_foreground = true;
		info!(target = "ar.session", "session running");
		Ok(())
	}

	/// `Running -> Paused`. Idempotent when paused or never started.
	pub fn stop(&mut self) -> Result<()> {
		match self.state {
			SessionState::Closed => Err(Error::SessionClosed),
			SessionState::Running => {
				self.pause_native();
				self.resume_on_foreground = false;
				info!(target = "ar.session", "session stopped");
				Ok(())
			}
			SessionState::Created | SessionState::Paused => {
				self.resume_on_foreground = false;
				Ok(())
			}
		}
	}

	/// Host moved to the background.
	pub fn pause(&mut self) {
		if self.state == SessionState::Running {
			self.pause_native();
			debug!(target = "ar.session", "session paused for background");
		}
	}

	/// Host returned to the foreground. Native failures are logged and swallowed.
	pub fn resume(&mut self) {
		if self.state != SessionState::Paused || !self.resume_on_foreground {
			trace!(target = "ar.session", state = ?self.state, "foreground resume skipped");
			return;
		}
		let Some(session) = self.session.as_mut() else {
			return;
		};
		match session.resume() {
			Ok(()) => {
				self.state = SessionState::Running;
				debug!(target = "ar.session", "session resumed from background");
			}
			Err(err) => {
				warn!(target = "ar.session", error = %err, "session resume failed; staying paused");
			}
		}
	}

	/// Any state `-> Closed`, releasing the native session.
	pub fn destroy(&mut self) {
		if self.state == SessionState::Closed {
			return;
		}
		if let Some(mut session) = self.session.take() {
			session.close();
		}
		self.state = SessionState::Closed;
		self.resume_on_foreground = false;
		info!(target = "ar.session", "session closed");
	}

	/// The native session, only while `Running`.
	pub fn running_mut(&mut self) -> Result<&mut NativeSession> {
		match self.state {
			SessionState::Closed => Err(Error::SessionClosed),
			SessionState::Running => self.session.as_deref_mut().ok_or(Error::SessionNotStarted),
			SessionState::Created | SessionState::Paused => Err(Error::SessionNotStarted),
		}
	}

	/// The native session while it exists (`Running` or `Paused`).
	pub fn live_mut(&mut self) -> Result<&mut NativeSession> {
		match self.state {
			SessionState::Closed => Err(Error::SessionClosed),
			_ => self.session.as_deref_mut().ok_or(Error::SessionNotStarted),
		}
	}

	fn pause_native(&mut self) {
		if let Some(session) = self.session.as_mut() {
			session.pause();
		}
		self.state = SessionState::Paused;
	}
}
