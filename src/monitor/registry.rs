use super::session::MonitorSession;
use crate::models::RobotId;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Active monitor sessions, at most one per robot
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<RobotId, Arc<MonitorSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, robot_id: &str) -> Option<Arc<MonitorSession>> {
        self.sessions.get(robot_id).map(|s| Arc::clone(&s))
    }

    pub fn contains(&self, robot_id: &str) -> bool {
        self.sessions.contains_key(robot_id)
    }

    pub(crate) fn insert(&self, session: Arc<MonitorSession>) -> Option<Arc<MonitorSession>> {
        self.sessions.insert(session.robot_id().to_string(), session)
    }

    pub(crate) fn remove(&self, robot_id: &str) -> Option<Arc<MonitorSession>> {
        self.sessions.remove(robot_id).map(|(_, s)| s)
    }

    /// Remove the robot's session only if it is still `session_id`.
    ///
    /// A dispatcher that outlived a restart must not evict its successor.
    pub(crate) fn remove_if_same(&self, robot_id: &str, session_id: Uuid) -> bool {
        self.sessions
            .remove_if(robot_id, |_, s| s.session_id() == session_id)
            .is_some()
    }

    pub fn robot_ids(&self) -> Vec<RobotId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_if_same_ignores_successor() {
        let registry = SessionRegistry::new();
        let (old, _rx) = MonitorSession::new("r1", 4, 4);
        let old_id = old.session_id();
        registry.insert(Arc::new(old));

        let (new, _rx2) = MonitorSession::new("r1", 4, 4);
        registry.insert(Arc::new(new));

        assert!(!registry.remove_if_same("r1", old_id));
        assert!(registry.contains("r1"));
        assert_eq!(registry.robot_ids(), vec!["r1".to_string()]);
    }
}
