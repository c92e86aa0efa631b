//! The client service supervisor (C6, spec §4.6): one state machine per
//! discovered client package.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use rtd_core::{TaskId, UidName};

use crate::binder::ServiceBinder;
use crate::error::{SupervisorError, SupervisorResult};

/// A discovered package's bind state (spec §4.6 diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// No active bind intention.
    Init,
    /// A bind was requested but the device user is locked.
    WaitingUserUnlock,
    /// A bind attempt is in flight.
    Binding,
    /// The service component is bound.
    Bound,
}

struct ServiceConnection {
    state: BindState,
    user_unlocked: bool,
    active_tasks: HashSet<TaskId>,
    task_deadline: Option<Instant>,
    unbind_timer: Option<JoinHandle<()>>,
}

impl ServiceConnection {
    fn new(user_unlocked: bool) -> Self {
        Self {
            state: BindState::Init,
            user_unlocked,
            active_tasks: HashSet::new(),
            task_deadline: None,
            unbind_timer: None,
        }
    }
}

/// A read-only snapshot of one connection, for dump/debug output.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    /// The package this connection belongs to.
    pub uid_name: UidName,
    /// Current bind state.
    pub state: BindState,
    /// Number of tasks currently counted active against this connection.
    pub active_task_count: usize,
}

/// One [`ServiceConnection`] per discovered `UidName`, all mutated under a
/// single lock (spec §3 invariant 1: at most one connection per UidName).
pub struct Supervisor {
    binder: Arc<dyn ServiceBinder>,
    task_unbind_delay: Duration,
    client_init_grace: Duration,
    connections: Arc<Mutex<HashMap<UidName, ServiceConnection>>>,
}

impl Supervisor {
    /// Construct a supervisor over the given service binder.
    ///
    /// `task_unbind_delay` is `TASK_UNBIND_DELAY_MS` (spec §6): how long a
    /// connection whose active set just emptied is kept bound to absorb a
    /// burst of follow-up tasks. `client_init_grace` is
    /// `ALLOWED_TIME_FOR_CLIENT_INIT_MS` (spec §4.6): the minimum bound
    /// lifetime granted the first time a connection starts binding, so the
    /// client has a real chance to register and attach its callback even
    /// if the task that triggered the bind carries a shorter budget.
    #[must_use]
    pub fn new(binder: Arc<dyn ServiceBinder>, task_unbind_delay: Duration, client_init_grace: Duration) -> Self {
        Self {
            binder,
            task_unbind_delay,
            client_init_grace,
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a newly discovered package (spec §4.8 step 3: "if discovery
    /// has not yet found this package, enqueue only"). Idempotent: a
    /// package already known keeps its existing connection untouched.
    pub async fn discover(&self, uid: &UidName, user_unlocked: bool) {
        let mut connections = self.connections.lock().await;
        connections
            .entry(uid.clone())
            .or_insert_with(|| ServiceConnection::new(user_unlocked));
    }

    /// Whether `uid` has been discovered (has a `ServiceConnection` at all).
    pub async fn is_discovered(&self, uid: &UidName) -> bool {
        self.connections.lock().await.contains_key(uid)
    }

    /// `bind_and_extend(deadline_abs)` (spec §4.6): extend the connection's
    /// task deadline and, if not already bound or binding, start a bind
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotDiscovered`] if `uid` has not been
    /// discovered yet.
    pub async fn bind_and_extend(&self, uid: &UidName, deadline_abs: Instant) -> SupervisorResult<()> {
        let mut should_attempt_bind = false;
        {
            let mut connections = self.connections.lock().await;
            let conn = connections
                .get_mut(uid)
                .ok_or_else(|| SupervisorError::NotDiscovered(uid.to_string()))?;

            conn.task_deadline = Some(conn.task_deadline.map_or(deadline_abs, |d| d.max(deadline_abs)));

            match conn.state {
                BindState::Init if conn.user_unlocked => {
                    conn.state = BindState::Binding;
                    should_attempt_bind = true;
                },
                BindState::Init => {
                    conn.state = BindState::WaitingUserUnlock;
                },
                BindState::WaitingUserUnlock | BindState::Binding | BindState::Bound => {},
            }

            if should_attempt_bind {
                // Init grace (spec §4.6): a short-budget task must not be
                // able to unbind a client before it has had a chance to
                // register and attach its callback.
                let floor = Instant::now() + self.client_init_grace;
                conn.task_deadline = Some(conn.task_deadline.map_or(floor, |d| d.max(floor)));
            }

            let deadline = conn.task_deadline.unwrap();
            self.rearm_timer(conn, uid.clone(), deadline);
        }

        if should_attempt_bind {
            self.spawn_bind_attempt(uid.clone());
        }
        Ok(())
    }

    /// The device user unlocked; retry binding for any connection that was
    /// waiting on it (spec §4.6 diagram: `WaitingUserUnlock --unlock
    /// event--> Binding`).
    pub async fn on_user_unlocked(&self, uid: &UidName) {
        let mut should_attempt_bind = false;
        {
            let mut connections = self.connections.lock().await;
            if let Some(conn) = connections.get_mut(uid) {
                conn.user_unlocked = true;
                if conn.state == BindState::WaitingUserUnlock {
                    conn.state = BindState::Binding;
                    should_attempt_bind = true;
                    let floor = Instant::now() + self.client_init_grace;
                    let deadline = conn.task_deadline.map_or(floor, |d| d.max(floor));
                    conn.task_deadline = Some(deadline);
                    self.rearm_timer(conn, uid.clone(), deadline);
                }
            }
        }
        if should_attempt_bind {
            self.spawn_bind_attempt(uid.clone());
        }
    }

    fn spawn_bind_attempt(&self, uid: UidName) {
        let binder = Arc::clone(&self.binder);
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            binder.bind(&uid).await;
            let mut connections = connections.lock().await;
            if let Some(conn) = connections.get_mut(&uid) {
                // onNullBinding and onConnected are indistinguishable here:
                // both move the diagram to Bound.
                if conn.state == BindState::Binding {
                    conn.state = BindState::Bound;
                    debug!(%uid, "service connection bound");
                }
            }
        });
    }

    /// Add task ids to the connection's active set.
    pub async fn add_active(&self, uid: &UidName, task_ids: impl IntoIterator<Item = TaskId>) {
        let mut connections = self.connections.lock().await;
        let Some(conn) = connections.get_mut(uid) else {
            return;
        };
        conn.active_tasks.extend(task_ids);
    }

    /// Remove a single task id from the connection's active set. When the
    /// set becomes empty, extends the connection's deadline by
    /// `TASK_UNBIND_DELAY` to absorb a burst of follow-up tasks (spec §4.6).
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NotDiscovered`] if `uid` is unknown, or
    /// [`SupervisorError::TaskNotActive`] if `task_id` was not in the active
    /// set.
    pub async fn remove_active(&self, uid: &UidName, task_id: &TaskId) -> SupervisorResult<()> {
        let mut connections = self.connections.lock().await;
        let conn = connections
            .get_mut(uid)
            .ok_or_else(|| SupervisorError::NotDiscovered(uid.to_string()))?;
        if !conn.active_tasks.remove(task_id) {
            return Err(SupervisorError::TaskNotActive(task_id.to_string()));
        }
        if conn.active_tasks.is_empty() {
            let new_deadline = Instant::now() + self.task_unbind_delay;
            let deadline = conn.task_deadline.map_or(new_deadline, |d| d.max(new_deadline));
            conn.task_deadline = Some(deadline);
            self.rearm_timer(conn, uid.clone(), deadline);
        }
        Ok(())
    }

    /// Clear a connection's active task set without otherwise disturbing
    /// its bind state (spec §4.4 `unregister`: "removes all active tasks
    /// for that client").
    pub async fn clear_active(&self, uid: &UidName) {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get_mut(uid) {
            conn.active_tasks.clear();
        }
    }

    /// The connection's current active task ids.
    pub async fn active_task_ids(&self, uid: &UidName) -> HashSet<TaskId> {
        self.connections
            .lock()
            .await
            .get(uid)
            .map(|c| c.active_tasks.clone())
            .unwrap_or_default()
    }

    /// Total active tasks across every connection (spec §3 invariant 5,
    /// §4.7 `maybe_shutdown`).
    pub async fn global_active_task_count(&self) -> usize {
        self.connections.lock().await.values().map(|c| c.active_tasks.len()).sum()
    }

    /// Current bind state, if the package has been discovered.
    pub async fn state_of(&self, uid: &UidName) -> Option<BindState> {
        self.connections.lock().await.get(uid).map(|c| c.state)
    }

    /// Force-unbind a single connection regardless of its current state or
    /// deadline (spec §4.6: "A forced unbind clears active tasks, cancels
    /// the timer, and dissolves the binding regardless of state").
    pub async fn force_unbind(&self, uid: &UidName) {
        Self::attempt_unbind(&self.connections, &self.binder, uid, true).await;
    }

    /// Force-unbind every known connection (spec §4.7: SHUTDOWN_PREPARE
    /// force-unbinds all supervisors).
    pub async fn force_unbind_all(&self) {
        let uids: Vec<UidName> = self.connections.lock().await.keys().cloned().collect();
        for uid in uids {
            self.force_unbind(&uid).await;
        }
    }

    async fn attempt_unbind(
        connections: &Mutex<HashMap<UidName, ServiceConnection>>,
        binder: &Arc<dyn ServiceBinder>,
        uid: &UidName,
        force: bool,
    ) {
        let should_unbind = {
            let mut connections = connections.lock().await;
            let Some(conn) = connections.get_mut(uid) else {
                return;
            };
            if !force {
                if let Some(deadline) = conn.task_deadline {
                    if Instant::now() < deadline {
                        // A newer extend already rearmed a fresh timer;
                        // this tick is stale.
                        return;
                    }
                }
            }
            conn.state = BindState::Init;
            conn.active_tasks.clear();
            conn.task_deadline = None;
            if let Some(handle) = conn.unbind_timer.take() {
                handle.abort();
            }
            true
        };
        if should_unbind {
            binder.unbind(uid).await;
            debug!(%uid, force, "service connection unbound");
        }
    }

    /// Replace the connection's unbind timer with one armed at `deadline`,
    /// cancelling whatever was armed before. Must be called while holding
    /// the connections lock.
    fn rearm_timer(&self, conn: &mut ServiceConnection, uid: UidName, deadline: Instant) {
        if let Some(handle) = conn.unbind_timer.take() {
            handle.abort();
        }
        let binder = Arc::clone(&self.binder);
        let connections = Arc::clone(&self.connections);
        let sleep_for = deadline.saturating_duration_since(Instant::now());
        conn.unbind_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            Self::attempt_unbind(&connections, &binder, &uid, false).await;
        }));
    }

    /// A read-only snapshot of every connection, for dump/debug output.
    pub async fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|(uid, conn)| ConnectionSnapshot {
                uid_name: uid.clone(),
                state: conn.state,
                active_task_count: conn.active_tasks.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServiceBinder;
    use std::time::Duration as StdDuration;

    fn supervisor(binder: Arc<MockServiceBinder>) -> Supervisor {
        Supervisor::new(binder, StdDuration::from_millis(50), StdDuration::from_millis(0))
    }

    #[tokio::test]
    async fn bind_and_extend_before_discovery_errors() {
        let sup = supervisor(Arc::new(MockServiceBinder::new()));
        let err = sup
            .bind_and_extend(&UidName::new("com.example.app"), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotDiscovered(_)));
    }

    #[tokio::test]
    async fn discover_then_bind_unlocked_transitions_to_bound() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = supervisor(binder.clone());
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, true).await;

        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_secs(30))
            .await
            .unwrap();
        // Bind happens on a spawned task; give it a chance to run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));
        assert_eq!(binder.bind_calls(&uid), 1);
    }

    #[tokio::test]
    async fn discover_locked_waits_for_unlock_event() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = supervisor(binder.clone());
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, false).await;

        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(sup.state_of(&uid).await, Some(BindState::WaitingUserUnlock));
        assert_eq!(binder.bind_calls(&uid), 0);

        sup.on_user_unlocked(&uid).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));
    }

    #[tokio::test]
    async fn active_task_accounting_round_trips() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = supervisor(binder);
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, true).await;
        let t1 = TaskId::from_existing("t1");
        sup.add_active(&uid, [t1.clone()]).await;
        assert_eq!(sup.global_active_task_count().await, 1);

        sup.remove_active(&uid, &t1).await.unwrap();
        assert_eq!(sup.global_active_task_count().await, 0);

        let err = sup.remove_active(&uid, &t1).await.unwrap_err();
        assert!(matches!(err, SupervisorError::TaskNotActive(_)));
    }

    #[tokio::test]
    async fn force_unbind_resets_state_and_clears_active_tasks() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = supervisor(binder.clone());
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, true).await;
        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_secs(30))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        sup.add_active(&uid, [TaskId::from_existing("t1")]).await;

        sup.force_unbind(&uid).await;

        assert_eq!(sup.state_of(&uid).await, Some(BindState::Init));
        assert_eq!(sup.global_active_task_count().await, 0);
        assert_eq!(binder.unbind_calls(&uid), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_bind_is_floored_by_init_grace_even_with_a_short_task_budget() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = Supervisor::new(binder.clone(), StdDuration::from_millis(50), StdDuration::from_secs(30));
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, true).await;

        // A task with a far shorter budget than the init grace must not be
        // able to unbind the client before it can register.
        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_millis(10))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));

        tokio::time::advance(StdDuration::from_millis(20)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));
        assert_eq!(binder.unbind_calls(&uid), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn init_grace_also_applies_on_the_unlock_triggered_transition() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = Supervisor::new(binder.clone(), StdDuration::from_millis(50), StdDuration::from_secs(30));
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, false).await;

        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(sup.state_of(&uid).await, Some(BindState::WaitingUserUnlock));

        sup.on_user_unlocked(&uid).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));

        tokio::time::advance(StdDuration::from_millis(20)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));
        assert_eq!(binder.unbind_calls(&uid), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_unbinds_after_task_unbind_delay() {
        let binder = Arc::new(MockServiceBinder::new());
        let sup = supervisor(binder.clone());
        let uid = UidName::new("com.example.app");
        sup.discover(&uid, true).await;
        sup.bind_and_extend(&uid, Instant::now() + StdDuration::from_millis(10))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(sup.state_of(&uid).await, Some(BindState::Bound));

        tokio::time::advance(StdDuration::from_millis(20)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sup.state_of(&uid).await, Some(BindState::Init));
        assert_eq!(binder.unbind_calls(&uid), 1);
    }
}
