#![no_main]

use libfuzzer_sys::fuzz_target;

use lobby_sync_client::protocol::{InboundEvent, ServerFrame};
use lobby_sync_client::reconcile::Reconciler;

// Feed arbitrary decoded frames through the reconciler and check its
// structural invariants: creator first, no duplicate identities, no
// mutation after a terminal event.
fuzz_target!(|data: &[u8]| {
    let mut reconciler = Reconciler::new(1);
    let mut terminal = false;

    for chunk in data.split(|b| *b == b'\n') {
        let event = match serde_json::from_slice::<ServerFrame>(chunk) {
            Ok(frame) => frame.event,
            Err(_) => continue,
        };
        let is_terminal_event = matches!(
            &event,
            InboundEvent::GameCancelled { game_id, .. } | InboundEvent::GameStarted { game_id }
                if *game_id == 1
        );
        let effects = reconciler.apply(event);
        if terminal {
            assert!(effects.is_empty(), "effects produced after terminal phase");
        }
        if is_terminal_event && reconciler.phase().is_terminal() {
            terminal = true;
        }

        if let Some(session) = reconciler.snapshot() {
            let roster = session.roster();
            if let Some(first) = roster.first() {
                if session.contains(session.creator_id) {
                    assert_eq!(first.user_id, session.creator_id, "creator must stay first");
                }
            }
            let mut ids: Vec<_> = roster.iter().map(|p| p.user_id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), roster.len(), "duplicate identities in roster");
        }
    }
});
