//! The session state machine.
//!
//! [`SessionState`] is the single owner of "who is signed in". It holds
//! the credential store, decides every transition, and tells observers
//! when the status changes.
//!
//! # Locking
//!
//! Transitions take a short synchronous mutex, update the store while
//! holding it, queue a snapshot, then release it before calling
//! observers. An observer may therefore call back into the session
//! (`snapshot()`, `username()`, even `logout()`) without deadlocking.
//!
//! Observers see status changes one at a time, in the order the
//! transitions happened, whichever thread made them. When transitions
//! race on several threads, the thread already delivering also delivers
//! the snapshots queued behind it, so the last snapshot an observer
//! receives is always the current state. No lock is ever held across an
//! `.await`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use authline_store::{CredentialStore, StorageBackend, TokenPair};
use authline_token::{Claims, Clock};

use crate::{ErrorKind, SessionError, SessionSnapshot, SessionStatus};

/// Identifies one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Internal status. The username lives inside the two signed-in phases,
/// so a snapshot can never report a username while anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Anonymous,
    Authenticating,
    Authenticated { username: String },
    Refreshing { username: String },
}

impl Phase {
    fn status(&self) -> SessionStatus {
        match self {
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Authenticating => SessionStatus::Authenticating,
            Self::Authenticated { .. } => SessionStatus::Authenticated,
            Self::Refreshing { .. } => SessionStatus::Refreshing,
        }
    }

    fn username(&self) -> Option<&str> {
        match self {
            Self::Authenticated { username } | Self::Refreshing { username } => {
                Some(username)
            }
            Self::Anonymous | Self::Authenticating => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    last_error: Option<ErrorKind>,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.phase.status(),
            username: self.phase.username().map(str::to_string),
            last_error: self.last_error,
        }
    }

    fn reject(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.phase.status(),
            event,
        }
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Observer)>,
}

/// Snapshots waiting to be delivered, in transition order.
///
/// Queued under the `inner` lock, so queue order is transition order.
/// Only one thread delivers at a time; a transition that finds delivery
/// already running leaves its snapshot for that thread.
#[derive(Default)]
struct Delivery {
    pending: VecDeque<SessionSnapshot>,
    running: bool,
}

/// The process-wide session: current phase, last failure, persisted
/// credentials and observers.
///
/// Share it behind an `Arc`. Every method takes `&self`.
pub struct SessionState<B: StorageBackend> {
    store: CredentialStore<B>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    observers: Mutex<Observers>,
    delivery: Mutex<Delivery>,
}

impl<B: StorageBackend> SessionState<B> {
    /// Derives the initial state from whatever `store` holds.
    ///
    /// | Stored pair            | Initial status | Notes |
    /// |------------------------|----------------|-------|
    /// | none                   | Anonymous      | |
    /// | access token unexpired | Authenticated  | username from claims |
    /// | access token expired   | Refreshing     | next protected call refreshes |
    /// | undecodable            | Anonymous      | store cleared, `last_error` set |
    /// | unreadable store       | Anonymous      | store cleared |
    pub fn restore(store: CredentialStore<B>, clock: impl Clock) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let (phase, last_error) = match store.load() {
            Ok(None) => (Phase::Anonymous, None),
            Ok(Some(pair)) => match authline_token::decode(&pair.access_token) {
                Ok(claims) if claims.is_expired(clock.now(), 0) => {
                    tracing::info!(
                        username = %claims.subject,
                        "restored session with expired access token"
                    );
                    (Phase::Refreshing { username: claims.subject }, None)
                }
                Ok(claims) => {
                    tracing::info!(username = %claims.subject, "restored session");
                    (Phase::Authenticated { username: claims.subject }, None)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stored access token is unusable, discarding");
                    clear_logged(&store);
                    (Phase::Anonymous, Some(ErrorKind::from(&e)))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "credential storage unreadable, discarding");
                clear_logged(&store);
                (Phase::Anonymous, None)
            }
        };

        Self {
            store,
            clock,
            inner: Mutex::new(Inner { phase, last_error }),
            observers: Mutex::new(Observers::default()),
            delivery: Mutex::new(Delivery::default()),
        }
    }

    // -- Transitions --------------------------------------------------------

    /// Anonymous → Authenticating.
    pub fn begin_login(&self) -> Result<(), SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Anonymous => {
                inner.phase = Phase::Authenticating;
                inner.last_error = None;
                Ok(())
            }
            _ => Err(inner.reject("begin_login")),
        })
    }

    /// Authenticating → Authenticated, persisting `pair`.
    ///
    /// If the access token cannot be decoded or the pair cannot be
    /// written, the session drops to Anonymous instead and the error is
    /// returned.
    pub fn complete_login(&self, pair: TokenPair) -> Result<Claims, SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Authenticating => self.accept(inner, &pair),
            _ => Err(inner.reject("complete_login")),
        })
    }

    /// Authenticating → Anonymous. Storage is left untouched.
    pub fn fail_login(&self, kind: ErrorKind) -> Result<(), SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Authenticating => {
                inner.phase = Phase::Anonymous;
                inner.last_error = Some(kind);
                Ok(())
            }
            _ => Err(inner.reject("fail_login")),
        })
    }

    /// Authenticated → Refreshing. Already Refreshing is a no-op.
    pub fn begin_refresh(&self) -> Result<(), SessionError> {
        self.apply(|inner| match &inner.phase {
            Phase::Authenticated { username } => {
                inner.phase = Phase::Refreshing {
                    username: username.clone(),
                };
                Ok(())
            }
            Phase::Refreshing { .. } => Ok(()),
            _ => Err(inner.reject("begin_refresh")),
        })
    }

    /// Refreshing → Authenticated, persisting the refreshed `pair`.
    ///
    /// Same failure handling as [`complete_login`](Self::complete_login).
    pub fn complete_refresh(&self, pair: TokenPair) -> Result<Claims, SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Refreshing { .. } => self.accept(inner, &pair),
            _ => Err(inner.reject("complete_refresh")),
        })
    }

    /// Refreshing → Anonymous: the refresh token is no good. Clears
    /// storage.
    pub fn fail_refresh(&self, kind: ErrorKind) -> Result<(), SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Refreshing { .. } => {
                self.drop_credentials(inner, Some(kind));
                Ok(())
            }
            _ => Err(inner.reject("fail_refresh")),
        })
    }

    /// Refreshing stays Refreshing after a transient failure (network,
    /// 5xx). Credentials are kept so the next call can try again.
    pub fn abort_refresh(&self, kind: ErrorKind) -> Result<(), SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Refreshing { .. } => {
                inner.last_error = Some(kind);
                Ok(())
            }
            _ => Err(inner.reject("abort_refresh")),
        })
    }

    /// Authenticated or Refreshing → Anonymous when the credentials turn
    /// out to be unusable (a second 401, a corrupt stored token). Clears
    /// storage.
    pub fn invalidate(&self, kind: ErrorKind) -> Result<(), SessionError> {
        self.apply(|inner| match inner.phase {
            Phase::Authenticated { .. } | Phase::Refreshing { .. } => {
                self.drop_credentials(inner, Some(kind));
                Ok(())
            }
            _ => Err(inner.reject("invalidate")),
        })
    }

    /// Any → Anonymous. Always clears storage; safe to call repeatedly.
    ///
    /// On a session that is already Anonymous only the store is cleared;
    /// `last_error` keeps saying why the session ended.
    pub fn logout(&self) {
        let _ = self.apply::<()>(|inner| {
            if inner.phase == Phase::Anonymous {
                clear_logged(&self.store);
                return Ok(());
            }
            if let Some(username) = inner.phase.username() {
                tracing::info!(%username, "logged out");
            }
            self.drop_credentials(inner, None);
            Ok(())
        });
    }

    // -- Queries ------------------------------------------------------------

    /// A copy of the current status, username and last error.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().phase.status()
    }

    /// The signed-in username, if any.
    pub fn username(&self) -> Option<String> {
        self.lock().phase.username().map(str::to_string)
    }

    /// The persisted token pair, if any.
    ///
    /// This is the only way to read token material back out. It exists
    /// for the request dispatcher; UI code has no business calling it.
    pub fn credentials(&self) -> Result<Option<TokenPair>, SessionError> {
        // Held so a concurrent transition can't clear between the two key
        // reads inside `load`.
        let _inner = self.lock();
        Ok(self.store.load()?)
    }

    /// The clock used for expiry decisions.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // -- Observers ----------------------------------------------------------

    /// Registers `observer` to be called with a fresh snapshot after
    /// every status change.
    pub fn subscribe(
        &self,
        observer: impl Fn(&SessionSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut observers = self.observers();
        let id = SubscriptionId(observers.next_id);
        observers.next_id += 1;
        observers.entries.push((id, Arc::new(observer)));
        id
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers();
        let before = observers.entries.len();
        observers.entries.retain(|(entry, _)| *entry != id);
        observers.entries.len() != before
    }

    /// Drops every observer. Call when the owning UI goes away.
    pub fn teardown(&self) {
        let dropped = std::mem::take(&mut self.observers().entries);
        tracing::debug!(observers = dropped.len(), "session observers torn down");
    }

    // -- Internals ----------------------------------------------------------

    /// Runs one transition under the lock, then notifies observers if the
    /// status moved. Failed transitions that still moved the status (an
    /// unusable token on `complete_login`) notify too.
    fn apply<R>(
        &self,
        transition: impl FnOnce(&mut Inner) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let (result, changed) = {
            let mut inner = self.lock();
            let before = inner.phase.status();
            let result = transition(&mut *inner);
            let after = inner.snapshot();
            let changed = before != after.status;
            if changed {
                tracing::debug!(from = %before, to = %after.status, "session status changed");
                self.delivery().pending.push_back(after);
            }
            (result, changed)
        };

        if changed {
            self.deliver();
        }
        result
    }

    /// Decodes and persists a freshly issued pair, moving to
    /// Authenticated. On any failure the session ends up Anonymous with
    /// an empty store.
    fn accept(&self, inner: &mut Inner, pair: &TokenPair) -> Result<Claims, SessionError> {
        let claims = match authline_token::decode(&pair.access_token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "issued access token is unusable");
                self.drop_credentials(inner, Some(ErrorKind::from(&e)));
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.save(pair) {
            tracing::warn!(error = %e, "failed to persist credentials");
            self.drop_credentials(inner, Some(ErrorKind::SessionExpired));
            return Err(e.into());
        }

        inner.phase = Phase::Authenticated {
            username: claims.subject.clone(),
        };
        inner.last_error = None;
        Ok(claims)
    }

    fn drop_credentials(&self, inner: &mut Inner, kind: Option<ErrorKind>) {
        clear_logged(&self.store);
        inner.phase = Phase::Anonymous;
        inner.last_error = kind;
    }

    /// Drains the delivery queue unless another thread (or an observer
    /// further up this thread's stack) already is.
    fn deliver(&self) {
        {
            let mut delivery = self.delivery();
            if delivery.running {
                return;
            }
            delivery.running = true;
        }
        let mut run = DeliveryRun {
            delivery: &self.delivery,
            done: false,
        };

        loop {
            let next = {
                let mut delivery = self.delivery();
                let next = delivery.pending.pop_front();
                // Give up the role under the same lock that saw the queue
                // empty, so a snapshot queued right after is not stranded.
                if next.is_none() {
                    delivery.running = false;
                }
                next
            };
            match next {
                Some(snapshot) => self.notify(&snapshot),
                None => {
                    run.done = true;
                    return;
                }
            }
        }
    }

    fn notify(&self, snapshot: &SessionSnapshot) {
        // Copy the list out so observers run without either lock held.
        let observers: Vec<Observer> = self
            .observers()
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(snapshot);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the delivery role if an observer panics mid-drain.
struct DeliveryRun<'a> {
    delivery: &'a Mutex<Delivery>,
    done: bool,
}

impl Drop for DeliveryRun<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .running = false;
        }
    }
}

impl<B: StorageBackend> fmt::Debug for SessionState<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn clear_logged<B: StorageBackend>(store: &CredentialStore<B>) {
    if let Err(e) = store.clear() {
        tracing::warn!(error = %e, "failed to clear stored credentials");
    }
}

// =========================================================================
// Tests
// =========================================================================
