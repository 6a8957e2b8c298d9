//! Ephemeral typing indicators with automatic expiry.
//!
//! Typing state lives only in memory: each active `(scope, user)` pair owns
//! a timer task that broadcasts the stop indicator when the quiet period
//! elapses without another start. A fresh start reschedules the timer
//! (last-write-wins); an explicit stop or a disconnect cancels it. Exactly
//! one stop indicator goes out per typing episode, whichever of the three
//! paths ends it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pulse_proto::event::ServerEvent;
use pulse_proto::ids::UserId;
use pulse_proto::message::Scope;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::hub::ConnId;
use crate::realtime::{HandlerError, Realtime};
use crate::rooms::RoomId;
use crate::store::ChatStore;

/// Default quiet period after which a typing indicator expires.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(3);

/// Tracks which users are typing in which conversation, with one expiry
/// timer per active pair.
pub struct TypingTracker {
    quiet_period: Duration,
    timers: Mutex<HashMap<(Scope, UserId), JoinHandle<()>>>,
}

impl TypingTracker {
    /// Creates a tracker whose timers fire after `quiet_period`.
    #[must_use]
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// The configured quiet period.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Installs the expiry timer for a pair. Returns `true` if the user was
    /// not already typing in this scope; an existing timer is aborted and
    /// replaced either way.
    pub async fn insert(&self, scope: Scope, user_id: UserId, timer: JoinHandle<()>) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.insert((scope, user_id), timer) {
            Some(previous) => {
                previous.abort();
                false
            }
            None => true,
        }
    }

    /// Removes a pair's timer without aborting it. The expiry path uses
    /// this so a firing timer can retire its own entry.
    pub async fn take(&self, scope: &Scope, user_id: &UserId) -> Option<JoinHandle<()>> {
        let mut timers = self.timers.lock().await;
        timers.remove(&(scope.clone(), user_id.clone()))
    }

    /// Aborts and removes every timer belonging to `user_id`, returning the
    /// scopes the user was typing in. Called on disconnect.
    pub async fn remove_user(&self, user_id: &UserId) -> Vec<Scope> {
        let mut timers = self.timers.lock().await;
        let keys: Vec<(Scope, UserId)> = timers
            .keys()
            .filter(|(_, user)| user == user_id)
            .cloned()
            .collect();
        let mut scopes = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(timer) = timers.remove(&key) {
                timer.abort();
            }
            scopes.push(key.0);
        }
        scopes
    }

    /// Returns `true` if the pair currently has an active timer.
    pub async fn is_typing(&self, scope: &Scope, user_id: &UserId) -> bool {
        let timers = self.timers.lock().await;
        timers.contains_key(&(scope.clone(), user_id.clone()))
    }

    /// Number of active typing pairs.
    pub async fn active(&self) -> usize {
        self.timers.lock().await.len()
    }
}

impl<S: ChatStore + 'static> Realtime<S> {
    /// Handles a typing-start frame: (re)schedules the expiry timer and, if
    /// the user was not already typing here, fans the indicator out to the
    /// rest of the conversation room.
    pub async fn start_typing(
        self: &Arc<Self>,
        conn: ConnId,
        scope: Scope,
    ) -> Result<(), HandlerError> {
        let user_id = self.user_of(conn).await?;

        let quiet = self.typing.quiet_period();
        let this = Arc::clone(self);
        let timer_scope = scope.clone();
        let timer_user = user_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            // Retire our own entry without abort; losing the race to an
            // explicit stop or a restart means staying silent.
            if this.typing.take(&timer_scope, &timer_user).await.is_some() {
                this.broadcast_typing(&timer_scope, &timer_user, false, None)
                    .await;
            }
        });

        let newly = self
            .typing
            .insert(scope.clone(), user_id.clone(), timer)
            .await;
        if newly {
            self.broadcast_typing(&scope, &user_id, true, Some(conn)).await;
        }
        Ok(())
    }

    /// Handles a typing-stop frame: cancels the pending expiry and fans out
    /// the stop indicator.
    pub async fn stop_typing(
        self: &Arc<Self>,
        conn: ConnId,
        scope: Scope,
    ) -> Result<(), HandlerError> {
        let user_id = self.user_of(conn).await?;
        if let Some(timer) = self.typing.take(&scope, &user_id).await {
            timer.abort();
            self.broadcast_typing(&scope, &user_id, false, Some(conn)).await;
        }
        Ok(())
    }

    /// Fans a typing indicator out to the conversation room, optionally
    /// excluding the triggering connection.
    pub(crate) async fn broadcast_typing(
        &self,
        scope: &Scope,
        user_id: &UserId,
        is_typing: bool,
        except: Option<ConnId>,
    ) {
        let event = ServerEvent::TypingIndicator {
            scope: scope.clone(),
            user_id: user_id.clone(),
            is_typing,
        };
        self.to_room(&RoomId::from_scope(scope), except, &event).await;
    }
}
