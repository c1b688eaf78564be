//! Client-side projection of one forming game session.
//!
//! [`Session`] is owned exclusively by the reconciler; every other
//! component receives cloned, read-only copies published through the
//! client's watch channel.

use crate::protocol::{GameId, GameSnapshot, PlayerColor, UserId};

/// Minimum session capacity.
pub const MIN_PLAYERS: u8 = 3;

/// Maximum session capacity.
pub const MAX_PLAYERS: u8 = 6;

/// A user's membership in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    /// Exclusive color; unique across the roster when assigned.
    pub color: Option<PlayerColor>,
}

/// Lifecycle phase of a session from the client's perspective.
///
/// `Unseeded → Forming → {Cancelled | Started}`; there is no transition
/// out of a terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// The seed snapshot has not resolved yet; live events are buffered.
    #[default]
    Unseeded,
    /// The lobby is assembling players.
    Forming,
    /// Terminal: the session was cancelled.
    Cancelled,
    /// Terminal: the session started and was promoted to a match.
    Started,
}

impl SessionPhase {
    /// Whether this phase admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Started)
    }
}

/// One game session being assembled before play starts.
///
/// Roster ordering is creator first, then join order. The roster never
/// contains duplicate participant identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: GameId,
    pub name: String,
    /// Player capacity, clamped to `[MIN_PLAYERS, MAX_PLAYERS]`.
    pub capacity: u8,
    pub creator_id: UserId,
    roster: Vec<Participant>,
}

impl Session {
    /// Build a session from a seed snapshot, reordering the roster so the
    /// creator comes first.
    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        let creator_id = snapshot.created_by.id;
        let mut roster: Vec<Participant> = Vec::with_capacity(snapshot.players.len());
        for entry in snapshot.players {
            let participant = Participant {
                user_id: entry.user.id,
                username: entry.user.username,
                color: entry.color,
            };
            if roster.iter().any(|p| p.user_id == participant.user_id) {
                continue;
            }
            if participant.user_id == creator_id {
                roster.insert(0, participant);
            } else {
                roster.push(participant);
            }
        }
        Self {
            id: snapshot.id,
            name: snapshot.name,
            capacity: snapshot.max_players.clamp(MIN_PLAYERS, MAX_PLAYERS),
            creator_id,
            roster,
        }
    }

    /// The ordered roster, creator first.
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.roster.iter().any(|p| p.user_id == user_id)
    }

    /// Add a participant, preserving the creator-first ordering.
    ///
    /// Returns `false` (leaving the roster untouched) if the identity is
    /// already present — duplicate-join tolerance.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(participant.user_id) {
            return false;
        }
        if participant.user_id == self.creator_id {
            self.roster.insert(0, participant);
        } else {
            self.roster.push(participant);
        }
        true
    }

    /// Remove a participant by identity. Returns `false` if absent.
    ///
    /// A shrinking roster never implies cancellation; that is a distinct
    /// explicit event.
    pub fn remove(&mut self, user_id: UserId) -> bool {
        let before = self.roster.len();
        self.roster.retain(|p| p.user_id != user_id);
        self.roster.len() != before
    }

    /// Overwrite a participant's exclusive color. Returns `false` if the
    /// identity is unknown.
    ///
    /// Color uniqueness is enforced server-side before broadcasting; the
    /// client applies blindly.
    pub fn set_color(&mut self, user_id: UserId, color: PlayerColor) -> bool {
        match self.roster.iter_mut().find(|p| p.user_id == user_id) {
            Some(p) => {
                p.color = Some(color);
                true
            }
            None => false,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{PlayerEntry, UserSummary};

    fn user(id: UserId, name: &str) -> UserSummary {
        UserSummary {
            id,
            username: name.into(),
        }
    }

    fn entry(id: UserId, name: &str, color: Option<PlayerColor>) -> PlayerEntry {
        PlayerEntry {
            user: user(id, name),
            color,
            joined_at: None,
        }
    }

    fn snapshot(players: Vec<PlayerEntry>) -> GameSnapshot {
        GameSnapshot {
            id: 1,
            name: "test-game".into(),
            max_players: 4,
            created_by: user(10, "creator"),
            players,
            status: None,
            created_at: None,
        }
    }

    #[test]
    fn from_snapshot_puts_creator_first() {
        let s = Session::from_snapshot(snapshot(vec![
            entry(20, "second", None),
            entry(10, "creator", Some(PlayerColor::Red)),
            entry(30, "third", None),
        ]));
        let ids: Vec<_> = s.roster().iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn from_snapshot_drops_duplicate_identities() {
        let s = Session::from_snapshot(snapshot(vec![
            entry(10, "creator", None),
            entry(20, "second", None),
            entry(20, "second-again", None),
        ]));
        assert_eq!(s.roster().len(), 2);
    }

    #[test]
    fn capacity_is_clamped_into_range() {
        let mut snap = snapshot(vec![]);
        snap.max_players = 2;
        assert_eq!(Session::from_snapshot(snap.clone()).capacity, MIN_PLAYERS);
        snap.max_players = 9;
        assert_eq!(Session::from_snapshot(snap).capacity, MAX_PLAYERS);
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut s = Session::from_snapshot(snapshot(vec![entry(10, "creator", None)]));
        assert!(s.add(Participant {
            user_id: 20,
            username: "u2".into(),
            color: None,
        }));
        assert!(!s.add(Participant {
            user_id: 20,
            username: "u2".into(),
            color: None,
        }));
        assert_eq!(s.roster().len(), 2);
    }

    #[test]
    fn creator_joining_late_lands_first() {
        let mut s = Session::from_snapshot(snapshot(vec![entry(20, "second", None)]));
        s.add(Participant {
            user_id: 10,
            username: "creator".into(),
            color: None,
        });
        assert_eq!(s.roster()[0].user_id, 10);
    }

    #[test]
    fn remove_is_a_plain_roster_shrink() {
        let mut s = Session::from_snapshot(snapshot(vec![
            entry(10, "creator", None),
            entry(20, "second", None),
        ]));
        assert!(s.remove(20));
        assert!(!s.remove(20));
        assert_eq!(s.roster().len(), 1);
    }

    #[test]
    fn set_color_overwrites_only_the_target() {
        let mut s = Session::from_snapshot(snapshot(vec![
            entry(10, "creator", Some(PlayerColor::Red)),
            entry(20, "second", None),
        ]));
        assert!(s.set_color(20, PlayerColor::Blue));
        assert_eq!(s.roster()[1].color, Some(PlayerColor::Blue));
        assert_eq!(s.roster()[0].color, Some(PlayerColor::Red));
    }

    #[test]
    fn set_color_for_unknown_id_is_a_noop() {
        let mut s = Session::from_snapshot(snapshot(vec![entry(10, "creator", None)]));
        let before = s.clone();
        assert!(!s.set_color(99, PlayerColor::Green));
        assert_eq!(s, before);
    }
}
