use std::fmt;

use serde::Serialize;

use crate::error::SupervisorError;
use crate::publisher::PublisherHandle;

/// One of the two fixed camera positions of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Board,
    Player,
}

impl Role {
    /// Fixed processing order for registration and teardown.
    pub const ALL: [Role; 2] = [Role::Board, Role::Player];

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Board => "board",
            Role::Player => "player",
        }
    }

    /// Synchronization source tag, distinct per role so the two streams never collide.
    pub const fn ssrc(self) -> u32 {
        match self {
            Role::Board => 1,
            Role::Player => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Active => "active",
            Phase::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// The process-wide streaming state. Only the supervisor mutates it, always
/// under its write lock.
pub struct Session {
    phase: Phase,
    active_room: Option<String>,
    signalling_base_url: Option<String>,
    board: Option<PublisherHandle>,
    player: Option<PublisherHandle>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            phase: Phase::Idle,
            active_room: None,
            signalling_base_url: None,
            board: None,
            player: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_room(&self) -> Option<&str> {
        self.active_room.as_deref()
    }

    pub fn signalling_base_url(&self) -> Option<&str> {
        self.signalling_base_url.as_deref()
    }

    pub fn slot(&self, role: Role) -> Option<&PublisherHandle> {
        match role {
            Role::Board => self.board.as_ref(),
            Role::Player => self.player.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, role: Role) -> &mut Option<PublisherHandle> {
        match role {
            Role::Board => &mut self.board,
            Role::Player => &mut self.player,
        }
    }

    /// Checks for an idle session and claims it for `room` in one step, so two
    /// concurrent starts can never both pass the check.
    pub fn begin_start(&mut self, base_url: &str, room: &str) -> Result<(), SupervisorError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Stopping => return Err(SupervisorError::Busy { phase: self.phase }),
            Phase::Starting | Phase::Active => {
                return Err(SupervisorError::AlreadyStreaming {
                    room: self.active_room.clone().unwrap_or_default(),
                })
            }
        }

        self.phase = Phase::Starting;
        self.active_room = Some(room.to_owned());
        self.signalling_base_url = Some(base_url.to_owned());
        Ok(())
    }

    pub fn activate(&mut self) {
        self.phase = Phase::Active;
    }

    /// Moves an active session to `Stopping` and returns its `(base_url, room)`.
    pub fn begin_stop(&mut self) -> Result<(String, String), SupervisorError> {
        match self.phase {
            Phase::Active => {}
            Phase::Idle => return Err(SupervisorError::NotStreaming),
            Phase::Starting | Phase::Stopping => {
                return Err(SupervisorError::Busy { phase: self.phase })
            }
        }

        let base_url = self.signalling_base_url.clone().unwrap_or_default();
        let room = self.active_room.clone().unwrap_or_default();
        self.phase = Phase::Stopping;
        Ok((base_url, room))
    }

    /// Back to `Idle`. Dropping the handles terminates anything still running.
    pub fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.active_room = None;
        self.signalling_base_url = None;
        self.board = None;
        self.player = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_claims_idle_session() {
        let mut session = Session::new();
        session.begin_start("https://sig.example", "r1").unwrap();

        assert_eq!(session.phase(), Phase::Starting);
        assert_eq!(session.active_room(), Some("r1"));
        assert_eq!(session.signalling_base_url(), Some("https://sig.example"));
    }

    #[test]
    fn second_start_reports_current_room() {
        let mut session = Session::new();
        session.begin_start("https://sig.example", "r1").unwrap();

        let err = session.begin_start("https://other.example", "r2").unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyStreaming { ref room } if room == "r1"));
        assert_eq!(session.active_room(), Some("r1"));
        assert_eq!(session.signalling_base_url(), Some("https://sig.example"));
    }

    #[test]
    fn stop_needs_active_session() {
        let mut session = Session::new();
        assert!(matches!(session.begin_stop(), Err(SupervisorError::NotStreaming)));

        session.begin_start("https://sig.example", "r1").unwrap();
        assert!(matches!(
            session.begin_stop(),
            Err(SupervisorError::Busy { phase: Phase::Starting })
        ));

        session.activate();
        let (base_url, room) = session.begin_stop().unwrap();
        assert_eq!(base_url, "https://sig.example");
        assert_eq!(room, "r1");
        assert_eq!(session.phase(), Phase::Stopping);

        session.clear();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.active_room(), None);
        assert_eq!(session.signalling_base_url(), None);
    }

    #[test]
    fn role_tags_are_distinct() {
        assert_eq!(Role::Board.ssrc(), 1);
        assert_eq!(Role::Player.ssrc(), 2);
        assert_eq!(Role::ALL, [Role::Board, Role::Player]);
        assert_eq!(Role::Player.to_string(), "player");
    }
}
