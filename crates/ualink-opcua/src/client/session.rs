// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! This module provides session lifecycle management for OPC UA connections,
//! including session creation, activation, keepalive, and re-activation on
//! a new secure channel.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::RequestDispatcher;
use crate::error::{OpcUaError, OpcUaResult, SessionError};
use crate::messages::{
    ActivateSessionRequest, ApplicationDescription, ApplicationType, CloseSessionRequest,
    CreateSessionRequest, EndpointDescription, ReadRequest, ReadValueId, identity_token,
};
use crate::types::{AttributeId, ByteString, LocalizedText, NodeId, OpcUaConfig, ServerState, TimestampsToReturn, ids};
use crate::value::OpcUaValue;

/// Length of the client nonce sent in CreateSession.
pub const CLIENT_NONCE_LENGTH: usize = 32;

// =============================================================================
// SessionState
// =============================================================================

/// State of an OPC UA session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is not created.
    #[default]
    NotCreated,

    /// Session creation is in progress.
    Creating,

    /// Session is created but not activated.
    Created,

    /// Session activation is in progress.
    Activating,

    /// Session is active and ready for use.
    Active,

    /// Session is being re-activated on a new channel.
    Renewing,

    /// Session is being closed.
    Closing,

    /// Session is closed.
    Closed,

    /// Session has failed.
    Failed,
}

impl SessionState {
    /// Returns `true` if the session is active and ready for use.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` while the authentication token may be sent.
    #[inline]
    pub fn has_token(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Activating | Self::Active | Self::Renewing
        )
    }

    /// Returns `true` if the session is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Activating | Self::Renewing | Self::Closing
        )
    }

    /// Returns `true` if the session has failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCreated => write!(f, "NotCreated"),
            Self::Creating => write!(f, "Creating"),
            Self::Created => write!(f, "Created"),
            Self::Activating => write!(f, "Activating"),
            Self::Active => write!(f, "Active"),
            Self::Renewing => write!(f, "Renewing"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// SessionInfo
// =============================================================================

/// Information about a created session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session id assigned by the server.
    pub session_id: NodeId,

    /// Token placed in every request header.
    pub authentication_token: NodeId,

    /// Session timeout granted by the server.
    pub revised_timeout: Duration,

    /// Nonce from the last Create/ActivateSession response.
    pub server_nonce: ByteString,

    /// Largest request the server accepts (0 = unlimited).
    pub max_request_message_size: u32,

    /// Endpoints returned by CreateSession.
    pub server_endpoints: Vec<EndpointDescription>,

    /// Session creation time.
    pub created_at: Instant,

    /// Last activity time.
    pub last_activity: Instant,
}

impl SessionInfo {
    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns the time since last activity.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Updates the last activity time.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Outcome of [`SessionManager::reactivate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reactivation {
    /// The existing session was moved to the new channel.
    Resumed,
    /// The server dropped the session; a new one was created and
    /// server-side subscriptions are gone.
    Recreated,
}

type StateCallback = Box<dyn Fn(SessionState, SessionState) + Send + Sync>;

// =============================================================================
// SessionManager
// =============================================================================

/// Manages OPC UA session lifecycle.
///
/// Requests go through the [`RequestDispatcher`], which in turn reads the
/// authentication token from this manager.
pub struct SessionManager {
    config: OpcUaConfig,
    state: RwLock<SessionState>,
    info: RwLock<Option<SessionInfo>>,
    stats: SessionStats,
    on_state_change: Mutex<Option<StateCallback>>,
}

impl SessionManager {
    /// Creates a new session manager.
    pub fn new(config: OpcUaConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SessionState::NotCreated),
            info: RwLock::new(None),
            stats: SessionStats::new(),
            on_state_change: Mutex::new(None),
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns the session info if a session exists.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.info.read().clone()
    }

    /// Returns the session id if a session exists.
    pub fn session_id(&self) -> Option<NodeId> {
        self.info.read().as_ref().map(|info| info.session_id.clone())
    }

    /// Returns the authentication token, or a null NodeId outside an
    /// active or activating session.
    pub fn authentication_token(&self) -> NodeId {
        if !self.state().has_token() {
            return NodeId::null();
        }
        self.info
            .read()
            .as_ref()
            .map(|info| info.authentication_token.clone())
            .unwrap_or_default()
    }

    /// Returns the session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Sets a callback for state changes.
    pub fn set_state_change_callback<F>(&self, callback: F)
    where
        F: Fn(SessionState, SessionState) + Send + Sync + 'static,
    {
        *self.on_state_change.lock() = Some(Box::new(callback));
    }

    /// Creates a new session. The session still has to be activated.
    pub async fn create(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<()> {
        let current_state = self.state();
        if current_state == SessionState::Creating {
            return Err(OpcUaError::session(SessionError::creation_failed(
                "Session creation already in progress",
            )));
        }

        self.set_state(SessionState::Creating);

        let nonce: [u8; CLIENT_NONCE_LENGTH] = rand::random();
        let request = CreateSessionRequest {
            client_description: ApplicationDescription {
                application_uri: Some(self.config.effective_application_uri()),
                product_uri: self.config.product_uri.clone(),
                application_name: LocalizedText::new(self.config.application_name.clone()),
                application_type: ApplicationType::Client,
                ..Default::default()
            },
            endpoint_url: Some(self.config.endpoint.clone()),
            session_name: Some(self.config.effective_session_name()),
            client_nonce: ByteString::from(nonce.to_vec()),
            requested_session_timeout: self.config.session_timeout.as_millis() as f64,
            max_response_message_size: self.config.limits.max_message_size,
            ..Default::default()
        };

        let response = match dispatcher.call(request).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_failure();
                self.set_state(SessionState::Failed);
                return Err(match e {
                    OpcUaError::Service(fault) => OpcUaError::session(
                        SessionError::creation_failed(fault.to_string()),
                    ),
                    other => other,
                });
            }
        };

        let now = Instant::now();
        let info = SessionInfo {
            session_id: response.session_id,
            authentication_token: response.authentication_token,
            revised_timeout: Duration::from_millis(response.revised_session_timeout.max(0.0) as u64),
            server_nonce: response.server_nonce,
            max_request_message_size: response.max_request_message_size,
            server_endpoints: response.server_endpoints,
            created_at: now,
            last_activity: now,
        };
        info!(
            endpoint = %self.config.endpoint,
            session_id = %info.session_id,
            revised_timeout = ?info.revised_timeout,
            "OPC UA session created"
        );

        *self.info.write() = Some(info);
        self.stats.record_creation();
        self.set_state(SessionState::Created);
        Ok(())
    }

    /// Activates a created session with the configured identity.
    pub async fn activate(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<()> {
        let current_state = self.state();
        match current_state {
            SessionState::Active => return Ok(()),
            SessionState::Created => {}
            _ => {
                return Err(OpcUaError::session(SessionError::activation_failed(
                    format!("Invalid state for activation: {current_state}, expected Created"),
                    None,
                )));
            }
        }

        self.set_state(SessionState::Activating);
        match self.send_activate(dispatcher).await {
            Ok(()) => {
                self.stats.record_activation();
                self.set_state(SessionState::Active);
                info!(
                    endpoint = %self.config.endpoint,
                    identity = ?self.config.user_identity,
                    "OPC UA session activated"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure();
                self.set_state(SessionState::Failed);
                Err(activation_error(e))
            }
        }
    }

    async fn send_activate(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<()> {
        let endpoints = self
            .info
            .read()
            .as_ref()
            .map(|info| info.server_endpoints.clone())
            .unwrap_or_default();

        let request = ActivateSessionRequest {
            locale_ids: vec!["en".to_string()],
            user_identity_token: identity_token(&self.config.user_identity, &endpoints),
            ..Default::default()
        };
        let response = dispatcher.call(request).await?;
        if let Some(info) = self.info.write().as_mut() {
            info.server_nonce = response.server_nonce;
            info.touch();
        }
        Ok(())
    }

    /// Creates and activates a session in one call.
    pub async fn create_and_activate(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<()> {
        self.create(dispatcher).await?;
        self.activate(dispatcher).await
    }

    /// Moves the session to a newly opened secure channel.
    ///
    /// Falls back to a new session when the server no longer knows the old
    /// one.
    pub async fn reactivate(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<Reactivation> {
        let current_state = self.state();
        if self.info.read().is_none()
            || matches!(current_state, SessionState::Closed | SessionState::NotCreated)
        {
            self.create_and_activate(dispatcher).await?;
            return Ok(Reactivation::Recreated);
        }

        self.set_state(SessionState::Renewing);
        match self.send_activate(dispatcher).await {
            Ok(()) => {
                self.stats.record_reconnection();
                self.set_state(SessionState::Active);
                info!(session_id = ?self.session_id(), "OPC UA session re-activated");
                Ok(Reactivation::Resumed)
            }
            Err(e) if e.is_session_invalid() => {
                warn!(
                    status = ?e.status_code(),
                    "Server dropped the session, creating a new one"
                );
                self.info.write().take();
                self.set_state(SessionState::NotCreated);
                self.create_and_activate(dispatcher).await?;
                self.stats.record_reconnection();
                Ok(Reactivation::Recreated)
            }
            Err(e) => {
                self.stats.record_failure();
                self.set_state(SessionState::Failed);
                Err(activation_error(e))
            }
        }
    }

    /// Closes the session and deletes its subscriptions on the server.
    pub async fn close(&self, dispatcher: &RequestDispatcher) -> OpcUaResult<()> {
        let current_state = self.state();
        if matches!(current_state, SessionState::Closed | SessionState::NotCreated) {
            return Ok(());
        }

        self.set_state(SessionState::Closing);
        if dispatcher.state().is_connected() {
            let request = CloseSessionRequest {
                delete_subscriptions: true,
                ..Default::default()
            };
            if let Err(e) = dispatcher.call(request).await {
                debug!(error = %e, "CloseSession failed");
            }
        }

        self.info.write().take();
        self.set_state(SessionState::Closed);
        info!(endpoint = %self.config.endpoint, "OPC UA session closed");
        Ok(())
    }

    /// Marks the session as unusable after a connection loss, keeping its
    /// token for re-activation.
    pub fn suspend(&self) {
        if self.state().has_token() {
            self.set_state(SessionState::Created);
        }
    }

    /// Records activity on the session.
    pub fn touch(&self) {
        if let Some(info) = self.info.write().as_mut() {
            info.touch();
        }
    }

    /// Checks if 75% of the session timeout passed without activity.
    pub fn needs_renewal(&self) -> bool {
        self.info
            .read()
            .as_ref()
            .is_some_and(|info| info.idle_time() > info.revised_timeout.mul_f64(0.75))
    }

    /// Fails with a session error unless the session is active.
    pub fn ensure_active(&self) -> OpcUaResult<()> {
        let state = self.state();
        if state.is_active() {
            Ok(())
        } else {
            Err(OpcUaError::session(SessionError::not_active(state)))
        }
    }

    /// Sets the session state with notification.
    fn set_state(&self, new_state: SessionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);
        if old_state != new_state {
            tracing::trace!(
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );

            if let Some(callback) = self.on_state_change.lock().as_ref() {
                callback(old_state, new_state);
            }
        }
    }

    // =========================================================================
    // Keep-alive
    // =========================================================================

    /// Reads the server state every `keepalive_interval`.
    ///
    /// After `max_keepalive_failures` consecutive failures the connection is
    /// marked lost. The task ends when the returned handle is aborted.
    pub fn spawn_keep_alive(self: &Arc<Self>, dispatcher: Arc<RequestDispatcher>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let interval = this.config.keepalive_interval;
            let max_failures = this.config.max_keepalive_failures.max(1);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failures = 0u32;

            loop {
                ticker.tick().await;
                if !this.state().is_active() || !dispatcher.state().is_connected() {
                    failures = 0;
                    continue;
                }

                match read_server_state(&dispatcher).await {
                    Ok(state) => {
                        failures = 0;
                        this.stats.record_keep_alive();
                        debug!(server_state = %state, "Keep-alive");
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(
                            error = %e,
                            failures,
                            max_failures,
                            "Keep-alive failed"
                        );
                        if failures >= max_failures {
                            failures = 0;
                            dispatcher.mark_connection_lost("keep-alive failed").await;
                        }
                    }
                }
            }
        })
    }
}

fn activation_error(e: OpcUaError) -> OpcUaError {
    match e {
        OpcUaError::Service(fault) => OpcUaError::session(SessionError::activation_failed(
            fault.to_string(),
            Some(fault.status()),
        )),
        other => other,
    }
}

async fn read_server_state(dispatcher: &RequestDispatcher) -> OpcUaResult<ServerState> {
    let request = ReadRequest {
        timestamps_to_return: TimestampsToReturn::Neither,
        nodes_to_read: vec![ReadValueId::new(
            NodeId::numeric(0, ids::SERVER_SERVER_STATUS_STATE),
            AttributeId::Value.value(),
        )],
        ..Default::default()
    };
    let response = dispatcher.call(request).await?;
    let value = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| OpcUaError::decoding("empty keep-alive read result"))?;
    if value.status.is_bad() {
        return Err(OpcUaError::service_fault("Read", value.status));
    }
    Ok(match value.value {
        OpcUaValue::Int32(v) => ServerState::from_value(v),
        _ => ServerState::Unknown,
    })
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session operations.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Number of sessions created.
    creations: AtomicU64,

    /// Number of session activations.
    activations: AtomicU64,

    /// Number of successful keep-alive reads.
    keep_alives: AtomicU64,

    /// Number of session failures.
    failures: AtomicU64,

    /// Number of re-activations after reconnect.
    reconnections: AtomicU64,
}

impl SessionStats {
    /// Creates new session statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a session creation.
    pub fn record_creation(&self) {
        self.creations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session activation.
    pub fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful keep-alive.
    pub fn record_keep_alive(&self) {
        self.keep_alives.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a session failure.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnection.
    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of session creations.
    pub fn creations(&self) -> u64 {
        self.creations.load(Ordering::Relaxed)
    }

    /// Returns the number of session activations.
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Returns the number of successful keep-alives.
    pub fn keep_alives(&self) -> u64 {
        self.keep_alives.load(Ordering::Relaxed)
    }

    /// Returns the number of session failures.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns the number of reconnections.
    pub fn reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.creations.store(0, Ordering::Relaxed);
        self.activations.store(0, Ordering::Relaxed);
        self.keep_alives.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.reconnections.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
