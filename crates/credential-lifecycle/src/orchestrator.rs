//! Per-user authentication policy and session ownership
//!
//! The orchestrator holds the only long-lived state outside the store: the
//! map of in-progress flow sessions, keyed by username. Starting a flow for
//! a user who already has one supersedes the old session, so only the most
//! recent authorization attempt can ever complete. Sessions are consumed
//! exactly once: `handle_callback` removes the session before delegating,
//! whatever the outcome, and a failed completion restarts from `begin_flow`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use idp_auth::CredentialStore;
use provider::{
    AuthError, CallbackPayload, CredentialRecord, Dialect, FlowSession, ProviderClient, Result,
};

/// Current unix time in milliseconds, for expiry checks.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Result of `ensure_authenticated`: either a usable credential or the URL
/// the user must visit to (re-)authorize.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(CredentialRecord),
    NeedsRedirect(String),
}

/// Lifecycle orchestrator for one provider and many independent users.
///
/// Operations for different usernames are fully independent; the session map
/// lock is held only for map access, never across a provider call.
pub struct Orchestrator {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn ProviderClient>,
    sessions: Mutex<HashMap<String, FlowSession>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn CredentialStore>, client: Arc<dyn ProviderClient>) -> Self {
        Self {
            store,
            client,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Produce a usable credential for `username`, or the redirect needed to
    /// get one.
    ///
    /// Reuses a fresh record directly; refreshes a stale OAuth2 record
    /// inline (persisting before returning); probes an OAuth1 record with
    /// `verify`. A rejected refresh token or rejected OAuth1 credential
    /// falls back to a fresh flow rather than failing. Store and provider
    /// failures propagate as-is.
    pub async fn ensure_authenticated(&self, username: &str) -> Result<AuthOutcome> {
        let Some(record) = self.store.get(username).await? else {
            debug!(username, "no stored credential, starting fresh flow");
            let url = self.start_flow(username).await?;
            return Ok(AuthOutcome::NeedsRedirect(url));
        };

        match record.dialect {
            Dialect::OAuth2 => self.ensure_oauth2(record).await,
            Dialect::OAuth1 => self.ensure_oauth1(record).await,
        }
    }

    /// Complete the pending flow for `username` with the provider's callback
    /// payload, persisting the resulting credential.
    ///
    /// Fails with `NoPendingFlow` when no flow was started (or its session
    /// was already consumed by an earlier callback).
    pub async fn handle_callback(
        &self,
        username: &str,
        payload: &CallbackPayload,
    ) -> Result<CredentialRecord> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(username)
            .ok_or_else(|| AuthError::NoPendingFlow(username.to_string()))?;

        let record = self.client.complete_flow(session, payload).await?;
        self.store.put(record.clone()).await?;
        info!(username, dialect = %record.dialect, "authentication completed");
        Ok(record)
    }

    /// Drop the stored credential and any pending flow for `username`.
    /// Idempotent: revoking an unknown user is not an error.
    pub async fn revoke(&self, username: &str) -> Result<()> {
        self.sessions.lock().await.remove(username);
        match self.store.delete(username).await {
            Ok(()) => {
                info!(username, "credential revoked");
                Ok(())
            }
            Err(AuthError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove flow sessions older than `max_age`, returning how many were
    /// dropped. The core never expires sessions on its own; callers invoke
    /// this at whatever cadence suits them.
    pub async fn purge_stale_sessions(&self, max_age: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.age() < max_age);
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, "purged abandoned flow sessions");
        }
        purged
    }

    /// Whether a started-but-uncompleted flow exists for `username`.
    pub async fn has_pending_flow(&self, username: &str) -> bool {
        self.sessions.lock().await.contains_key(username)
    }

    async fn ensure_oauth2(&self, record: CredentialRecord) -> Result<AuthOutcome> {
        if !record.is_expired_at(now_millis()) {
            debug!(username = %record.username, "stored credential still fresh");
            return Ok(AuthOutcome::Authenticated(record));
        }

        if !record.has_refresh_secret() {
            warn!(username = %record.username, "expired credential without refresh token, restarting flow");
            let url = self.start_flow(&record.username).await?;
            return Ok(AuthOutcome::NeedsRedirect(url));
        }

        match self.client.refresh(&record).await {
            Ok(refreshed) => {
                self.store.put(refreshed.clone()).await?;
                info!(username = %record.username, "refreshed credential persisted");
                Ok(AuthOutcome::Authenticated(refreshed))
            }
            Err(AuthError::RefreshTokenInvalid(reason)) => {
                warn!(username = %record.username, reason, "refresh token rejected, restarting flow");
                let url = self.start_flow(&record.username).await?;
                Ok(AuthOutcome::NeedsRedirect(url))
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_oauth1(&self, record: CredentialRecord) -> Result<AuthOutcome> {
        if self.client.verify(&record).await? {
            debug!(username = %record.username, "stored credential verified");
            return Ok(AuthOutcome::Authenticated(record));
        }

        // The provider declared the credential dead; drop it so a later
        // lookup doesn't retry a known-bad token.
        match self.store.delete(&record.username).await {
            Ok(()) | Err(AuthError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        warn!(username = %record.username, "stored credential rejected by provider, restarting flow");
        let url = self.start_flow(&record.username).await?;
        Ok(AuthOutcome::NeedsRedirect(url))
    }

    /// Begin a fresh flow and take ownership of its session, superseding any
    /// pending one for the same user.
    async fn start_flow(&self, username: &str) -> Result<String> {
        let start = self.client.begin_flow(username).await?;

        let mut sessions = self.sessions.lock().await;
        if sessions
            .insert(username.to_string(), start.session)
            .is_some()
        {
            debug!(username, "superseded pending flow session");
        }
        info!(username, "authentication flow started");
        Ok(start.redirect_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use idp_auth::{FileStore, MemoryStore};
    use provider::{FlowStart, FlowState};

    /// Scripted provider client driving the orchestrator without a network.
    ///
    /// `begin_flow` numbers its sessions so tests can tell attempts apart;
    /// `complete_flow` enforces the same state/token checks as the real
    /// clients; `refresh` and `verify` follow the configured outcomes.
    struct StubClient {
        dialect: Dialect,
        reject_refresh: bool,
        verify_valid: bool,
        begin_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    impl StubClient {
        fn oauth2() -> Self {
            Self {
                dialect: Dialect::OAuth2,
                reject_refresh: false,
                verify_valid: true,
                begin_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
            }
        }

        fn oauth1() -> Self {
            Self {
                dialect: Dialect::OAuth1,
                ..Self::oauth2()
            }
        }

        fn rejecting_refresh(mut self) -> Self {
            self.reject_refresh = true;
            self
        }

        fn invalid_credentials(mut self) -> Self {
            self.verify_valid = false;
            self
        }

        fn begin_count(&self) -> usize {
            self.begin_calls.load(Ordering::SeqCst)
        }
    }

    impl ProviderClient for StubClient {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        fn begin_flow<'a>(
            &'a self,
            username: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<FlowStart>> + Send + 'a>> {
            Box::pin(async move {
                let n = self.begin_calls.fetch_add(1, Ordering::SeqCst) + 1;
                let start = match self.dialect {
                    Dialect::OAuth2 => FlowStart {
                        redirect_url: format!("https://provider.test/authorize?state=state-{n}"),
                        session: FlowSession::oauth2(
                            username,
                            format!("state-{n}"),
                            format!("verifier-{n}"),
                        ),
                    },
                    Dialect::OAuth1 => FlowStart {
                        redirect_url: format!("https://provider.test/authorize?oauth_token=req-{n}"),
                        session: FlowSession::oauth1(
                            username,
                            format!("req-{n}"),
                            format!("req-sec-{n}"),
                        ),
                    },
                };
                Ok(start)
            })
        }

        fn complete_flow<'a>(
            &'a self,
            session: FlowSession,
            payload: &'a CallbackPayload,
        ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
            Box::pin(async move {
                let FlowSession {
                    username, state, ..
                } = session;
                match state {
                    FlowState::OAuth2 { csrf_state, .. } => {
                        if payload.get("state") != Some(csrf_state.as_str()) {
                            return Err(AuthError::CsrfMismatch);
                        }
                        let code = payload.get("code").ok_or_else(|| {
                            AuthError::InvalidVerifier("callback missing code".into())
                        })?;
                        Ok(CredentialRecord {
                            username,
                            dialect: Dialect::OAuth2,
                            primary_secret: format!("at-{code}"),
                            secondary_secret: format!("rt-{code}"),
                            expires_at: Some(now_millis() + 3_600_000),
                            scopes: ["tweet.read".to_string()].into_iter().collect(),
                        })
                    }
                    FlowState::OAuth1 { request_token, .. } => {
                        if payload.get("oauth_token") != Some(request_token.as_str()) {
                            return Err(AuthError::InvalidVerifier(
                                "callback oauth_token does not match the pending request token"
                                    .into(),
                            ));
                        }
                        let verifier = payload.get("oauth_verifier").ok_or_else(|| {
                            AuthError::InvalidVerifier("callback missing oauth_verifier".into())
                        })?;
                        Ok(CredentialRecord {
                            username,
                            dialect: Dialect::OAuth1,
                            primary_secret: format!("tok-{verifier}"),
                            secondary_secret: format!("tok-sec-{verifier}"),
                            expires_at: None,
                            scopes: BTreeSet::new(),
                        })
                    }
                }
            })
        }

        fn refresh<'a>(
            &'a self,
            record: &'a CredentialRecord,
        ) -> Pin<Box<dyn Future<Output = Result<CredentialRecord>> + Send + 'a>> {
            Box::pin(async move {
                if self.reject_refresh {
                    return Err(AuthError::RefreshTokenInvalid("invalid_grant".into()));
                }
                let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(CredentialRecord {
                    username: record.username.clone(),
                    dialect: Dialect::OAuth2,
                    primary_secret: format!("at-refreshed-{n}"),
                    secondary_secret: record.secondary_secret.clone(),
                    expires_at: Some(now_millis() + 3_600_000),
                    scopes: record.scopes.clone(),
                })
            })
        }

        fn verify<'a>(
            &'a self,
            _record: &'a CredentialRecord,
        ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
            Box::pin(async move { Ok(self.verify_valid) })
        }
    }

    fn orchestrator(client: Arc<StubClient>) -> Orchestrator {
        Orchestrator::new(Arc::new(MemoryStore::new()), client)
    }

    fn oauth2_record(username: &str, expires_at: Option<u64>) -> CredentialRecord {
        CredentialRecord {
            username: username.into(),
            dialect: Dialect::OAuth2,
            primary_secret: format!("at-{username}"),
            secondary_secret: format!("rt-{username}"),
            expires_at,
            scopes: ["tweet.read".to_string()].into_iter().collect(),
        }
    }

    fn oauth1_record(username: &str) -> CredentialRecord {
        CredentialRecord {
            username: username.into(),
            dialect: Dialect::OAuth1,
            primary_secret: format!("tok-{username}"),
            secondary_secret: format!("tok-sec-{username}"),
            expires_at: None,
            scopes: BTreeSet::new(),
        }
    }

    fn far_future() -> u64 {
        now_millis() + 86_400_000
    }

    #[tokio::test]
    async fn absent_record_starts_flow_and_returns_redirect() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client.clone());

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::NeedsRedirect(url) = outcome else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("https://provider.test/authorize"));
        assert!(orch.has_pending_flow("alice").await);
        assert_eq!(client.begin_count(), 1);
    }

    #[tokio::test]
    async fn fresh_record_is_reused_without_provider_calls() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client.clone());
        orch.store
            .put(oauth2_record("alice", Some(far_future())))
            .await
            .unwrap();

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::Authenticated(record) = outcome else {
            panic!("expected authenticated");
        };
        assert_eq!(record.primary_secret, "at-alice");
        assert_eq!(client.begin_count(), 0);
        assert!(!orch.has_pending_flow("alice").await);
    }

    #[tokio::test]
    async fn repeated_ensure_supersedes_the_pending_session() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client.clone());

        let first = orch.ensure_authenticated("alice").await.unwrap();
        let second = orch.ensure_authenticated("alice").await.unwrap();
        let (AuthOutcome::NeedsRedirect(url1), AuthOutcome::NeedsRedirect(url2)) = (first, second)
        else {
            panic!("expected two redirects");
        };
        assert_ne!(url1, url2);
        assert_eq!(client.begin_count(), 2);

        // Only the most recent attempt validates: the superseded state fails
        // and nothing is persisted.
        let stale = CallbackPayload::from_pairs([("state", "state-1"), ("code", "c1")]);
        let err = orch.handle_callback("alice", &stale).await.unwrap_err();
        assert!(matches!(err, AuthError::CsrfMismatch), "got: {err:?}");
        assert!(orch.store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_session_completes_after_supersession() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client);

        orch.ensure_authenticated("alice").await.unwrap();
        orch.ensure_authenticated("alice").await.unwrap();

        let payload = CallbackPayload::from_pairs([("state", "state-2"), ("code", "c2")]);
        let record = orch.handle_callback("alice", &payload).await.unwrap();
        assert_eq!(record.primary_secret, "at-c2");
        assert_eq!(
            orch.store.get("alice").await.unwrap().unwrap().primary_secret,
            "at-c2"
        );
    }

    #[tokio::test]
    async fn callback_without_pending_flow_fails() {
        let orch = orchestrator(Arc::new(StubClient::oauth2()));
        let payload = CallbackPayload::from_pairs([("state", "s"), ("code", "c")]);

        let err = orch.handle_callback("alice", &payload).await.unwrap_err();
        assert!(matches!(err, AuthError::NoPendingFlow(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn failed_callback_consumes_the_session() {
        let orch = orchestrator(Arc::new(StubClient::oauth2()));
        orch.ensure_authenticated("alice").await.unwrap();

        let bad = CallbackPayload::from_pairs([("state", "wrong"), ("code", "c")]);
        let err = orch.handle_callback("alice", &bad).await.unwrap_err();
        assert!(matches!(err, AuthError::CsrfMismatch));

        // Consumed exactly once: a retry needs a fresh begin_flow.
        assert!(!orch.has_pending_flow("alice").await);
        let retry = CallbackPayload::from_pairs([("state", "state-1"), ("code", "c")]);
        let err = orch.handle_callback("alice", &retry).await.unwrap_err();
        assert!(matches!(err, AuthError::NoPendingFlow(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn expired_record_refreshes_and_persists() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client.clone());
        orch.store
            .put(oauth2_record("alice", Some(1_000)))
            .await
            .unwrap();

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::Authenticated(record) = outcome else {
            panic!("expected authenticated");
        };
        assert_eq!(record.primary_secret, "at-refreshed-1");
        // The refresh token survived and the store reflects the update
        assert_eq!(record.secondary_secret, "rt-alice");
        let stored = orch.store.get("alice").await.unwrap().unwrap();
        assert_eq!(stored.primary_secret, "at-refreshed-1");
        assert_eq!(client.begin_count(), 0);
    }

    #[tokio::test]
    async fn record_expiring_exactly_now_is_treated_as_expired() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client.clone());
        orch.store
            .put(oauth2_record("alice", Some(now_millis())))
            .await
            .unwrap();

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::Authenticated(record) = outcome else {
            panic!("expected authenticated");
        };
        assert_eq!(record.primary_secret, "at-refreshed-1");
    }

    #[tokio::test]
    async fn rejected_refresh_token_falls_back_to_fresh_flow() {
        let client = Arc::new(StubClient::oauth2().rejecting_refresh());
        let orch = orchestrator(client.clone());
        orch.store
            .put(oauth2_record("alice", Some(1_000)))
            .await
            .unwrap();

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        assert!(matches!(outcome, AuthOutcome::NeedsRedirect(_)));
        assert!(orch.has_pending_flow("alice").await);
        assert_eq!(client.begin_count(), 1);
    }

    #[tokio::test]
    async fn verified_oauth1_record_is_reused() {
        let client = Arc::new(StubClient::oauth1());
        let orch = orchestrator(client.clone());
        orch.store.put(oauth1_record("bob")).await.unwrap();

        let outcome = orch.ensure_authenticated("bob").await.unwrap();
        let AuthOutcome::Authenticated(record) = outcome else {
            panic!("expected authenticated");
        };
        assert_eq!(record.primary_secret, "tok-bob");
        assert_eq!(client.begin_count(), 0);
    }

    #[tokio::test]
    async fn rejected_oauth1_record_is_dropped_and_flow_restarted() {
        let client = Arc::new(StubClient::oauth1().invalid_credentials());
        let orch = orchestrator(client.clone());
        orch.store.put(oauth1_record("bob")).await.unwrap();

        let outcome = orch.ensure_authenticated("bob").await.unwrap();
        assert!(matches!(outcome, AuthOutcome::NeedsRedirect(_)));
        // The dead record is gone, not retried on the next lookup
        assert!(orch.store.get("bob").await.unwrap().is_none());
        assert!(orch.has_pending_flow("bob").await);
    }

    #[tokio::test]
    async fn oauth1_callback_completes_with_verifier() {
        let orch = orchestrator(Arc::new(StubClient::oauth1()));
        orch.ensure_authenticated("bob").await.unwrap();

        let payload =
            CallbackPayload::from_pairs([("oauth_token", "req-1"), ("oauth_verifier", "v-9")]);
        let record = orch.handle_callback("bob", &payload).await.unwrap();
        assert_eq!(record.dialect, Dialect::OAuth1);
        assert_eq!(record.expires_at, None);
        assert_eq!(
            orch.store.get("bob").await.unwrap().unwrap().primary_secret,
            "tok-v-9"
        );
    }

    #[tokio::test]
    async fn revoke_drops_record_and_pending_session() {
        let orch = orchestrator(Arc::new(StubClient::oauth2()));
        orch.store
            .put(oauth2_record("alice", Some(far_future())))
            .await
            .unwrap();
        orch.ensure_authenticated("carol").await.unwrap();

        orch.revoke("alice").await.unwrap();
        orch.revoke("carol").await.unwrap();
        assert!(orch.store.get("alice").await.unwrap().is_none());
        assert!(!orch.has_pending_flow("carol").await);

        // Revoking an unknown user is a no-op
        orch.revoke("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn purge_drops_only_sessions_past_max_age() {
        let orch = orchestrator(Arc::new(StubClient::oauth2()));
        orch.ensure_authenticated("alice").await.unwrap();
        orch.ensure_authenticated("bob").await.unwrap();

        assert_eq!(orch.purge_stale_sessions(Duration::from_secs(600)).await, 0);
        assert!(orch.has_pending_flow("alice").await);

        assert_eq!(orch.purge_stale_sessions(Duration::ZERO).await, 2);
        assert!(!orch.has_pending_flow("alice").await);
        assert!(!orch.has_pending_flow("bob").await);
    }

    #[tokio::test]
    async fn users_flows_stay_independent() {
        let orch = orchestrator(Arc::new(StubClient::oauth2()));
        orch.ensure_authenticated("alice").await.unwrap();
        orch.ensure_authenticated("bob").await.unwrap();

        // Completing bob's flow leaves alice's pending
        let payload = CallbackPayload::from_pairs([("state", "state-2"), ("code", "cb")]);
        orch.handle_callback("bob", &payload).await.unwrap();
        assert!(orch.has_pending_flow("alice").await);
        assert!(!orch.has_pending_flow("bob").await);
        assert!(orch.store.get("alice").await.unwrap().is_none());
    }

    // The full journey: no record → redirect → callback → authenticated →
    // expiry → transparent refresh with a new access token.
    #[tokio::test]
    async fn full_lifecycle_for_a_new_user() {
        let client = Arc::new(StubClient::oauth2());
        let orch = orchestrator(client);

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::NeedsRedirect(url) = outcome else {
            panic!("expected redirect");
        };
        assert!(url.contains("https://provider.test/authorize"));
        assert!(url.contains("state-1"));

        let payload = CallbackPayload::from_pairs([("state", "state-1"), ("code", "c1")]);
        let record = orch.handle_callback("alice", &payload).await.unwrap();
        let original_access = record.primary_secret.clone();
        assert!(orch.store.get("alice").await.unwrap().is_some());

        // Simulate time passing: the stored record's expiry is now behind us
        let mut expired = record;
        expired.expires_at = Some(now_millis().saturating_sub(1));
        orch.store.put(expired).await.unwrap();

        let outcome = orch.ensure_authenticated("alice").await.unwrap();
        let AuthOutcome::Authenticated(refreshed) = outcome else {
            panic!("expected authenticated");
        };
        assert_ne!(refreshed.primary_secret, original_access);
        assert_eq!(
            orch.store.get("alice").await.unwrap().unwrap().primary_secret,
            refreshed.primary_secret
        );
    }

    #[tokio::test]
    async fn refreshed_credential_survives_a_store_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = Arc::new(FileStore::load(path.clone()).await.unwrap());
        let orch = Orchestrator::new(store, Arc::new(StubClient::oauth2()));
        orch.store
            .put(oauth2_record("alice", Some(1_000)))
            .await
            .unwrap();
        orch.ensure_authenticated("alice").await.unwrap();

        // A brand-new store instance sees the refreshed token on disk
        let reloaded = FileStore::load(path).await.unwrap();
        let record = reloaded.get("alice").await.unwrap().unwrap();
        assert_eq!(record.primary_secret, "at-refreshed-1");
        assert!(!record.is_expired_at(now_millis()));
    }
}
