//! Live-session registry with a poll index.
//!
//! Each engine owns one registry; nothing here is process-global.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::error::StartError;
use crate::model::GroupId;
use crate::session::{read, write, ExamSession};
use crate::traits::PollId;

struct PollRoute {
    session: Arc<ExamSession>,
    index: usize,
}

/// Sessions keyed by group, plus poll id → (session, question) routing.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<GroupId, Arc<ExamSession>>>,
    polls: RwLock<HashMap<PollId, PollRoute>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session unless the group already has one.
    pub fn try_register(&self, session: Arc<ExamSession>) -> Result<(), StartError> {
        let mut sessions = write(&self.sessions);
        let group = session.group();
        if sessions.contains_key(&group) {
            return Err(StartError::AlreadyRunning(group));
        }
        sessions.insert(group, session);
        Ok(())
    }

    pub fn get(&self, group: GroupId) -> Option<Arc<ExamSession>> {
        read(&self.sessions).get(&group).cloned()
    }

    /// Route a poll to its session. Ignored if the session is no longer
    /// registered, so a late dispatch step cannot resurrect stale routes.
    pub fn index_poll(&self, poll_id: PollId, session: &Arc<ExamSession>, index: usize) -> bool {
        let sessions = read(&self.sessions);
        let registered = sessions
            .get(&session.group())
            .is_some_and(|s| s.id() == session.id());
        if !registered {
            return false;
        }
        write(&self.polls).insert(
            poll_id,
            PollRoute {
                session: Arc::clone(session),
                index,
            },
        );
        true
    }

    /// Resolve a poll id to its session and question index.
    pub fn route(&self, poll_id: &str) -> Option<(Arc<ExamSession>, usize)> {
        read(&self.polls)
            .get(poll_id)
            .map(|route| (Arc::clone(&route.session), route.index))
    }

    /// Remove the group's session if it is `session_id`, purging its polls.
    pub fn remove(&self, group: GroupId, session_id: Uuid) -> Option<Arc<ExamSession>> {
        let mut sessions = write(&self.sessions);
        if !sessions.get(&group).is_some_and(|s| s.id() == session_id) {
            return None;
        }
        let removed = sessions.remove(&group)?;
        write(&self.polls).retain(|_, route| route.session.id() != session_id);
        Some(removed)
    }

    /// Number of sessions still dispatching questions.
    pub fn active_count(&self) -> usize {
        read(&self.sessions)
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    pub fn len(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = read(&self.sessions).keys().copied().collect();
        groups.sort_unstable();
        groups
    }
}
