//! The event reconciler: the single authority for turning an inbound
//! event plus the previous session snapshot into a new snapshot.
//!
//! Reconciliation is synchronous and runs on one logical task, so the
//! merge rules need no internal locking. Events are applied sequentially
//! in arrival order; the transport guarantees FIFO delivery per topic and
//! the client never reorders.
//!
//! Until the seed snapshot resolves the reconciler is *unseeded*: live
//! roster events are buffered, then drained in order once the seed
//! arrives. A buffered terminal event (cancellation received while the
//! fetch was still pending) takes the session straight to its terminal
//! phase without ever exposing a forming snapshot to observers.

use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::{GameId, GameSnapshot, InboundEvent, PlayerEntry};
use crate::session::{Participant, Session, SessionPhase};

/// Observable outcome of applying an event.
///
/// Effects are what the reconciler asks its caller to publish; the
/// snapshot itself never leaves the reconciler except as a copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The snapshot changed; carries the new read-only copy.
    SnapshotChanged(Session),
    /// Terminal: session cancelled, local snapshot cleared.
    Cancelled {
        game_id: GameId,
        message: Option<String>,
    },
    /// Terminal: session promoted to a match.
    Started { game_id: GameId },
    /// A command was rejected server-side; surface transiently, do not
    /// mutate the session.
    Rejected { message: String },
}

/// Per-session state machine applying inbound events to the local snapshot.
#[derive(Debug)]
pub struct Reconciler {
    game_id: GameId,
    phase: SessionPhase,
    session: Option<Session>,
    /// Events that arrived before the seed resolved.
    pending: VecDeque<InboundEvent>,
}

impl Reconciler {
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            phase: SessionPhase::Unseeded,
            session: None,
            pending: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The current snapshot, if the session is forming.
    pub fn snapshot(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Seed the session from a one-shot snapshot fetch, then drain any
    /// events buffered while the fetch was in flight.
    ///
    /// Intermediate snapshots produced by the drain are collapsed: at most
    /// one [`Effect::SnapshotChanged`] is returned, and none at all if a
    /// buffered event took the session terminal.
    pub fn seed(&mut self, snapshot: GameSnapshot) -> Vec<Effect> {
        if self.phase != SessionPhase::Unseeded {
            debug!(game_id = self.game_id, "ignoring seed in phase {:?}", self.phase);
            return Vec::new();
        }
        if snapshot.id != self.game_id {
            debug!(
                expected = self.game_id,
                got = snapshot.id,
                "ignoring seed for a different session"
            );
            return Vec::new();
        }

        self.session = Some(Session::from_snapshot(snapshot));
        self.phase = SessionPhase::Forming;

        let mut effects = Vec::new();
        while let Some(event) = self.pending.pop_front() {
            for effect in self.apply_live(event) {
                // Collapse intermediate snapshots; one copy is published
                // at the end if the session is still forming.
                if !matches!(effect, Effect::SnapshotChanged(_)) {
                    effects.push(effect);
                }
            }
            if self.phase.is_terminal() {
                self.pending.clear();
                break;
            }
        }

        if self.phase == SessionPhase::Forming {
            if let Some(session) = &self.session {
                effects.push(Effect::SnapshotChanged(session.clone()));
            }
        }
        effects
    }

    /// Apply one inbound event according to the current phase.
    pub fn apply(&mut self, event: InboundEvent) -> Vec<Effect> {
        if self.phase.is_terminal() {
            debug!(game_id = self.game_id, "dropping event in terminal phase");
            return Vec::new();
        }

        if self.phase == SessionPhase::Unseeded {
            return self.apply_unseeded(event);
        }
        self.apply_live(event)
    }

    fn apply_unseeded(&mut self, event: InboundEvent) -> Vec<Effect> {
        match event {
            // A creation acknowledgment carries a full snapshot and seeds
            // the session exactly like the REST fetch.
            InboundEvent::GameCreated { game } => self.seed(game),
            // Rejections do not merge into the snapshot; surface them
            // immediately instead of buffering.
            InboundEvent::Error { message } => vec![Effect::Rejected { message }],
            InboundEvent::Pong | InboundEvent::Unknown => Vec::new(),
            other => {
                if other.game_id() == Some(self.game_id) {
                    self.pending.push_back(other);
                } else {
                    debug!(game_id = self.game_id, "dropping unscoped event while unseeded");
                }
                Vec::new()
            }
        }
    }

    /// Merge rules for a seeded, forming session.
    fn apply_live(&mut self, event: InboundEvent) -> Vec<Effect> {
        // Events scoped to a different session are ignored outright.
        if let Some(id) = event.game_id() {
            if id != self.game_id {
                return Vec::new();
            }
        }

        match event {
            InboundEvent::UserJoined { player, .. } => {
                self.mutate(|session| session.add(participant_from(player)))
            }
            InboundEvent::UserLeft { user_id, .. } => {
                self.mutate(|session| session.remove(user_id))
            }
            InboundEvent::PlayerColorChanged { user_id, color, .. } => {
                self.mutate(|session| session.set_color(user_id, color))
            }
            InboundEvent::GameCancelled { message, .. } => {
                self.phase = SessionPhase::Cancelled;
                self.session = None;
                vec![Effect::Cancelled {
                    game_id: self.game_id,
                    message,
                }]
            }
            InboundEvent::GameStarted { .. } => {
                self.phase = SessionPhase::Started;
                self.session = None;
                vec![Effect::Started {
                    game_id: self.game_id,
                }]
            }
            InboundEvent::GameCreated { .. } => Vec::new(),
            InboundEvent::Error { message } => vec![Effect::Rejected { message }],
            InboundEvent::Pong | InboundEvent::Unknown => Vec::new(),
        }
    }

    /// Run a roster mutation; publish a snapshot copy only if it reports
    /// an actual change.
    fn mutate<F>(&mut self, f: F) -> Vec<Effect>
    where
        F: FnOnce(&mut Session) -> bool,
    {
        match self.session.as_mut() {
            Some(session) => {
                if f(session) {
                    vec![Effect::SnapshotChanged(session.clone())]
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        }
    }
}

fn participant_from(entry: PlayerEntry) -> Participant {
    Participant {
        user_id: entry.user.id,
        username: entry.user.username,
        color: entry.color,
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
    use crate::protocol::{PlayerColor, UserSummary};

    fn entry(id: i64, name: &str, color: Option<PlayerColor>) -> PlayerEntry {
        PlayerEntry {
            user: UserSummary {
                id,
                username: name.into(),
            },
            color,
            joined_at: None,
        }
    }

    fn snapshot(id: i64, players: Vec<PlayerEntry>) -> GameSnapshot {
        GameSnapshot {
            id,
            name: "test-game".into(),
            max_players: 4,
            created_by: UserSummary {
                id: 1,
                username: "u1".into(),
            },
            players,
            status: None,
            created_at: None,
        }
    }

    fn joined(game_id: i64, user_id: i64, name: &str) -> InboundEvent {
        InboundEvent::UserJoined {
            game_id,
            player: entry(user_id, name, None),
        }
    }

    fn seeded(game_id: i64) -> Reconciler {
        let mut r = Reconciler::new(game_id);
        let effects = r.seed(snapshot(game_id, vec![entry(1, "u1", None)]));
        assert_eq!(effects.len(), 1);
        r
    }

    #[test]
    fn seed_then_join_with_duplicate() {
        // Seed {id:1, creator:U1, roster:[U1]}, then UserJoined(U2),
        // UserJoined(U1) duplicate — final roster [U1, U2].
        let mut r = seeded(1);
        assert_eq!(r.apply(joined(1, 2, "u2")).len(), 1);
        assert!(r.apply(joined(1, 1, "u1")).is_empty());

        let ids: Vec<_> = r
            .snapshot()
            .unwrap()
            .roster()
            .iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn duplicate_join_is_idempotent() {
        let mut r = seeded(1);
        r.apply(joined(1, 2, "u2"));
        let before = r.snapshot().unwrap().clone();
        let effects = r.apply(joined(1, 2, "u2"));
        assert!(effects.is_empty());
        assert_eq!(r.snapshot().unwrap(), &before);
    }

    #[test]
    fn join_and_leave_never_duplicate_and_keep_creator_first() {
        let mut r = seeded(1);
        let events = vec![
            joined(1, 2, "u2"),
            joined(1, 3, "u3"),
            joined(1, 2, "u2"),
            InboundEvent::UserLeft {
                game_id: 1,
                user_id: 2,
            },
            joined(1, 2, "u2"),
        ];
        for event in events {
            r.apply(event);
            let roster = r.snapshot().unwrap().roster();
            let mut ids: Vec<_> = roster.iter().map(|p| p.user_id).collect();
            assert_eq!(roster[0].user_id, 1, "creator must stay first");
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), roster.len(), "no duplicate identities");
        }
    }

    #[test]
    fn color_change_targets_one_participant() {
        let mut r = seeded(1);
        r.apply(InboundEvent::PlayerColorChanged {
            game_id: 1,
            user_id: 1,
            color: PlayerColor::Red,
        });
        r.apply(joined(1, 2, "u2"));
        let effects = r.apply(InboundEvent::PlayerColorChanged {
            game_id: 1,
            user_id: 2,
            color: PlayerColor::Blue,
        });
        assert_eq!(effects.len(), 1);
        let roster = r.snapshot().unwrap().roster();
        assert_eq!(roster[0].color, Some(PlayerColor::Red));
        assert_eq!(roster[1].color, Some(PlayerColor::Blue));
    }

    #[test]
    fn color_change_for_unknown_participant_is_a_noop() {
        let mut r = seeded(1);
        let before = r.snapshot().unwrap().clone();
        let effects = r.apply(InboundEvent::PlayerColorChanged {
            game_id: 1,
            user_id: 99,
            color: PlayerColor::Green,
        });
        assert!(effects.is_empty());
        assert_eq!(r.snapshot().unwrap(), &before);
    }

    #[test]
    fn no_event_mutates_after_cancellation() {
        let mut r = seeded(1);
        let effects = r.apply(InboundEvent::GameCancelled {
            game_id: 1,
            message: Some("creator left".into()),
        });
        assert!(matches!(effects.as_slice(), [Effect::Cancelled { .. }]));
        assert!(r.snapshot().is_none());
        assert_eq!(r.phase(), SessionPhase::Cancelled);

        assert!(r.apply(joined(1, 5, "late")).is_empty());
        assert!(r
            .apply(InboundEvent::GameStarted { game_id: 1 })
            .is_empty());
        assert_eq!(r.phase(), SessionPhase::Cancelled);
    }

    #[test]
    fn started_is_terminal_and_clears_snapshot() {
        let mut r = seeded(1);
        let effects = r.apply(InboundEvent::GameStarted { game_id: 1 });
        assert_eq!(effects, vec![Effect::Started { game_id: 1 }]);
        assert!(r.snapshot().is_none());
        assert!(r.phase().is_terminal());
    }

    #[test]
    fn events_for_other_sessions_are_ignored() {
        let mut r = seeded(1);
        assert!(r.apply(joined(2, 7, "elsewhere")).is_empty());
        assert!(r
            .apply(InboundEvent::GameCancelled {
                game_id: 2,
                message: None,
            })
            .is_empty());
        assert_eq!(r.phase(), SessionPhase::Forming);
    }

    #[test]
    fn unseeded_events_are_buffered_then_drained_in_order() {
        let mut r = Reconciler::new(1);
        assert!(r.apply(joined(1, 2, "u2")).is_empty());
        assert!(r.apply(joined(1, 3, "u3")).is_empty());
        assert!(r.snapshot().is_none());

        let effects = r.seed(snapshot(1, vec![entry(1, "u1", None)]));
        // One collapsed snapshot publication.
        assert_eq!(effects.len(), 1);
        let ids: Vec<_> = r
            .snapshot()
            .unwrap()
            .roster()
            .iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn buffered_cancellation_never_exposes_a_forming_snapshot() {
        let mut r = Reconciler::new(1);
        r.apply(InboundEvent::GameCancelled {
            game_id: 1,
            message: Some("gone".into()),
        });

        let effects = r.seed(snapshot(1, vec![entry(1, "u1", None)]));
        assert_eq!(
            effects,
            vec![Effect::Cancelled {
                game_id: 1,
                message: Some("gone".into()),
            }]
        );
        assert!(r.snapshot().is_none());
        assert_eq!(r.phase(), SessionPhase::Cancelled);
    }

    #[test]
    fn creation_ack_seeds_an_unseeded_session() {
        let mut r = Reconciler::new(1);
        let effects = r.apply(InboundEvent::GameCreated {
            game: snapshot(1, vec![entry(1, "u1", None)]),
        });
        assert_eq!(effects.len(), 1);
        assert_eq!(r.phase(), SessionPhase::Forming);
    }

    #[test]
    fn creation_ack_after_seed_is_ignored() {
        let mut r = seeded(1);
        let before = r.snapshot().unwrap().clone();
        let effects = r.apply(InboundEvent::GameCreated {
            game: snapshot(1, vec![]),
        });
        assert!(effects.is_empty());
        assert_eq!(r.snapshot().unwrap(), &before);
    }

    #[test]
    fn rejection_surfaces_without_mutating() {
        let mut r = seeded(1);
        let before = r.snapshot().unwrap().clone();
        let effects = r.apply(InboundEvent::Error {
            message: "Color already taken".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::Rejected {
                message: "Color already taken".into(),
            }]
        );
        assert_eq!(r.snapshot().unwrap(), &before);
    }

    #[test]
    fn unknown_event_kinds_are_noops() {
        let mut r = seeded(1);
        let before = r.snapshot().unwrap().clone();
        assert!(r.apply(InboundEvent::Unknown).is_empty());
        assert!(r.apply(InboundEvent::Pong).is_empty());
        assert_eq!(r.snapshot().unwrap(), &before);
    }

    #[test]
    fn seed_for_wrong_session_is_rejected() {
        let mut r = Reconciler::new(1);
        assert!(r.seed(snapshot(2, vec![])).is_empty());
        assert_eq!(r.phase(), SessionPhase::Unseeded);
    }
}
