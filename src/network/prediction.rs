//! Prediction / Rollback
//!
//! Renders ahead of confirmed input by running the step on a clone of
//! the authoritative state. Only known events are fed in; a remote
//! player with no event keeps its stored buttons. The branch is thrown
//! away every frame, so rollback is simply not keeping it.

use crate::game::config::GameConfig;
use crate::game::events::GameEvent;
use crate::game::state::StateData;
use crate::game::tick::simulate_tic;

use super::event_log::EventLog;

/// A speculative branch.
#[derive(Debug, Clone)]
pub struct PredictedState {
    /// Speculative state
    pub state: StateData,
    /// Effects of the latest authoritative tic followed by predicted ones
    pub effects: Vec<GameEvent>,
    /// Ticks run past the authoritative state
    pub ticks: u32,
}

/// Run up to `max_ticks` speculative ticks, or `None` when nothing is owed.
pub fn predict(
    authoritative: &StateData,
    effects: &[GameEvent],
    log: &EventLog,
    owed: u32,
    max_ticks: u32,
    config: &GameConfig,
) -> Option<PredictedState> {
    let ticks = owed.min(max_ticks);
    if ticks == 0 {
        return None;
    }

    let mut branch = PredictedState {
        state: authoritative.clone(),
        effects: effects.to_vec(),
        ticks,
    };
    for _ in 0..ticks {
        let tic = branch.state.tic.wrapping_add(1);
        let events = log.events_for(tic);
        branch.effects.extend(simulate_tic(&mut branch.state, &events, config).events);
    }
    Some(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::actor::ActorKind;
    use crate::game::input::{ClientEvent, ControlBits};

    fn setup() -> (StateData, EventLog, GameConfig) {
        let config = GameConfig::default();
        let state = StateData::new(11, &config);
        let mut log = EventLog::new();
        log.push_local(ClientEvent::spawn(1, 1, 0));
        log.insert_received(ClientEvent::spawn(2, 2, 1));
        log.push_local(ClientEvent::buttons(3, 1, ControlBits::NONE.with(ControlBits::MOVE, true)));
        (state, log, config)
    }

    #[test]
    fn test_nothing_owed() {
        let (state, log, config) = setup();
        assert!(predict(&state, &[], &log, 0, 8, &config).is_none());
        assert!(predict(&state, &[], &log, 5, 0, &config).is_none());
    }

    #[test]
    fn test_bounded_and_authoritative_untouched() {
        let (state, log, config) = setup();
        let before = state.compute_hash();

        let branch = predict(&state, &[], &log, 50, 8, &config).unwrap();
        assert_eq!(branch.ticks, 8);
        assert_eq!(branch.state.tic, state.tic + 8);
        assert_eq!(branch.state.list(ActorKind::Player).len(), 2);
        assert_eq!(branch.effects.iter().filter(|e| e.tic <= 2).count(), 2);

        assert_eq!(state.compute_hash(), before);
        assert_eq!(state.tic, 0);
    }

    #[test]
    fn test_matches_authoritative_when_confirmed() {
        let (state, log, config) = setup();
        let branch = predict(&state, &[], &log, 3, 8, &config).unwrap();

        let mut confirmed = state.clone();
        for tic in 1..=3 {
            simulate_tic(&mut confirmed, &log.events_for(tic), &config);
        }
        assert_eq!(branch.state, confirmed);
    }
}
