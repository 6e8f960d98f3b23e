use crate::error::DartsError;
use crate::games::darts::{Match, Resolution, ThrowRecord, Turn};
use crate::games::GameState;
use crate::throw_log::{LogEntry, ThrowLog};

// Drives one match against its throw log. Every turn is written to the log
// before it is committed to the match, so the two never disagree about which
// turns happened.
pub struct Session {
    game: Match,
    log: Box<dyn ThrowLog>,
    // Resolved turn whose record could not be saved yet
    pending: Option<(Resolution, ThrowRecord)>,
}

impl Session {
    pub fn start(game: Match, mut log: Box<dyn ThrowLog>) -> Result<Self, DartsError> {
        log.upsert(&LogEntry::MatchStarted(game.started()))?;
        log::info!(
            "Started {} match {} with {} players",
            game.variant(),
            game.id(),
            game.n_players()
        );

        Ok(Self { game, log, pending: None })
    }

    // Continue a match rebuilt from the same log
    pub fn resume(game: Match, log: Box<dyn ThrowLog>) -> Self {
        log::info!("Resumed match {} at turn {}", game.id(), game.turn_number());
        Self { game, log, pending: None }
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn log(&self) -> &dyn ThrowLog {
        &*self.log
    }

    pub fn pending(&self) -> Option<&ThrowRecord> {
        self.pending.as_ref().map(|(_, record)| record)
    }

    pub fn submit(&mut self, turn: &Turn) -> Result<ThrowRecord, DartsError> {
        if let Some(record) = self.pending() {
            return Err(DartsError::state(format!(
                "turn {} of {} has not been saved yet",
                record.turn_number, record.player
            )));
        }

        let (resolution, record) = self.game.resolve_turn(turn)?;
        log::debug!("Resolved turn {:?} as {:?}", turn, resolution);

        self.pending = Some((resolution, record));
        self.retry()
    }

    // Send the pending record again, unchanged, and commit it once it is saved
    pub fn retry(&mut self) -> Result<ThrowRecord, DartsError> {
        let (resolution, record) = self
            .pending
            .clone()
            .ok_or_else(|| DartsError::state("no turn is waiting to be saved"))?;

        if let Err(err) = self.log.upsert(&LogEntry::Throw(record.clone())) {
            log::warn!("Turn {} of {} not saved: {}", record.turn_number, record.player, err);
            return Err(err);
        }

        self.pending = None;
        self.game.apply_resolved_turn(&resolution)?;

        if record.bust {
            log::warn!("Bust for {} on turn {}", record.player, record.turn_number);
        }
        if let Some(winner) = &record.winner {
            log::info!("{} wins match {} on turn {}", winner, record.match_id, record.turn_number);
        }

        Ok(record)
    }

    // New match with the same variant and roster, logged to the same place
    pub fn restart(&mut self) -> Result<(), DartsError> {
        let names: Vec<&str> = self.game.players().iter().map(|p| p.name.as_str()).collect();
        let game = Match::start(self.game.variant(), names)?;
        self.log.upsert(&LogEntry::MatchStarted(game.started()))?;
        log::info!("Started {} match {}", game.variant(), game.id());

        self.game = game;
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::darts::Variant;
    use crate::throw_log::MemoryThrowLog;
    use std::cell::Cell;
    use std::rc::Rc;

    // Memory log that refuses the first `failures` throw writes, and every
    // match start while `reject_starts` is set
    struct FlakyLog {
        inner: MemoryThrowLog,
        failures: usize,
        reject_starts: Rc<Cell<bool>>,
    }

    impl ThrowLog for FlakyLog {
        fn upsert(&mut self, entry: &LogEntry) -> Result<(), DartsError> {
            if matches!(entry, LogEntry::Throw(_)) && self.failures > 0 {
                self.failures -= 1;
                return Err(DartsError::persistence("disk full"));
            }
            if matches!(entry, LogEntry::MatchStarted(_)) && self.reject_starts.get() {
                return Err(DartsError::persistence("disk full"));
            }
            self.inner.upsert(entry)
        }

        fn entries(&self) -> &[LogEntry] {
            self.inner.entries()
        }
    }

    fn session(failures: usize) -> Session {
        let game = Match::start(Variant::FiveOhOne, ["Eoin", "John"]).unwrap();
        let log = FlakyLog {
            inner: MemoryThrowLog::new(),
            failures,
            reject_starts: Rc::default(),
        };
        Session::start(game, Box::new(log)).unwrap()
    }

    fn throws(session: &Session) -> Vec<ThrowRecord> {
        session.log().history(session.game().id()).unwrap().1
    }

    #[test]
    fn test_submit_persists_then_commits() {
        let mut session = session(0);
        let record = session.submit(&Turn::new([60, 60, 60], false)).unwrap();

        assert_eq!(record.remaining, 321);
        assert_eq!(session.game().turn_number(), 2);
        assert_eq!(session.game().current().name, "John");
        assert_eq!(throws(&session), vec![record]);
    }

    #[test]
    fn test_failed_write_leaves_match_untouched() {
        let mut session = session(1);
        let err = session.submit(&Turn::new([60, 60, 60], false)).unwrap_err();
        assert!(matches!(err, DartsError::PersistenceFailure { .. }));

        assert_eq!(session.game().turn_number(), 1);
        assert_eq!(session.game().current().remaining, 501);
        assert_eq!(session.pending().map(|r| r.turn_number), Some(1));
        assert!(throws(&session).is_empty());

        // No new turn until the pending one is saved
        let err = session.submit(&Turn::new([1, 1, 1], false)).unwrap_err();
        assert!(matches!(err, DartsError::InvalidState { .. }));

        let pending = session.pending().cloned().unwrap();
        let record = session.retry().unwrap();
        assert_eq!(record, pending);
        assert_eq!(session.game().turn_number(), 2);
        assert_eq!(session.game().players()[0].remaining, 321);
        assert_eq!(throws(&session), vec![record]);

        let err = session.retry().unwrap_err();
        assert!(matches!(err, DartsError::InvalidState { .. }));
        assert_eq!(session.game().turn_number(), 2);
    }

    #[test]
    fn test_invalid_input_is_not_logged() {
        let mut session = session(0);
        let err = session.submit(&Turn::new([181, 0, 0], false)).unwrap_err();
        assert!(matches!(err, DartsError::InvalidInput { .. }));
        assert!(session.pending().is_none());
        assert!(throws(&session).is_empty());
        assert_eq!(session.game().turn_number(), 1);
    }

    #[test]
    fn test_play_to_winner_and_restart() {
        let mut session = session(0);
        for darts in [[180, 180, 101], [0, 0, 0], [20, 10, 0], [0, 0, 0]] {
            session.submit(&Turn::new(darts, false)).unwrap();
        }

        // Finishing without a double busts
        let record = session.submit(&Turn::new([10, 0, 0], false)).unwrap();
        assert!(record.bust);
        assert_eq!(session.game().players()[0].busts, 1);

        session.submit(&Turn::new([0, 0, 0], false)).unwrap();
        let record = session.submit(&Turn::new([10, 0, 0], true)).unwrap();
        assert_eq!(record.winner.as_deref(), Some("Eoin"));
        assert!(session.game().is_game_over());

        let err = session.submit(&Turn::new([0, 0, 0], false)).unwrap_err();
        assert!(matches!(err, DartsError::InvalidState { .. }));
        assert_eq!(throws(&session).len(), 7);

        let finished = session.game().id();
        session.restart().unwrap();
        assert_ne!(session.game().id(), finished);
        assert_eq!(session.game().turn_number(), 1);
        assert!(!session.game().is_game_over());
        assert_eq!(session.log().matches().len(), 2);
    }

    #[test]
    fn test_failed_restart_keeps_finished_match() {
        let reject_starts = Rc::new(Cell::new(false));
        let game = Match::start(Variant::FiveOhOne, ["Eoin", "John"]).unwrap();
        let log = FlakyLog {
            inner: MemoryThrowLog::new(),
            failures: 0,
            reject_starts: reject_starts.clone(),
        };
        let mut session = Session::start(game, Box::new(log)).unwrap();
        for (darts, is_double) in [([180, 180, 101], false), ([0, 0, 0], false), ([20, 20, 0], true)] {
            session.submit(&Turn::new(darts, is_double)).unwrap();
        }
        assert!(session.game().is_game_over());

        let finished = session.game().id();
        reject_starts.set(true);
        let err = session.restart().unwrap_err();
        assert!(matches!(err, DartsError::PersistenceFailure { .. }));
        assert_eq!(session.game().id(), finished);
        assert!(session.game().is_game_over());
        assert_eq!(session.log().matches().len(), 1);

        reject_starts.set(false);
        session.restart().unwrap();
        assert_ne!(session.game().id(), finished);
        assert_eq!(session.log().matches().len(), 2);
    }

    #[test]
    fn test_resume_continues_from_log() {
        let mut session = session(0);
        session.submit(&Turn::new([60, 60, 60], false)).unwrap();
        session.submit(&Turn::new([20, 20, 20], false)).unwrap();
        session.submit(&Turn::new([5, 5, 1], false)).unwrap();

        let mut log = MemoryThrowLog::new();
        for entry in session.log().entries() {
            log.upsert(entry).unwrap();
        }

        let (started, history) = log.history(session.game().id()).unwrap();
        let game = Match::restore(&started, &history).unwrap();
        let mut resumed = Session::resume(game, Box::new(log));

        assert_eq!(resumed.game().turn_number(), 4);
        assert_eq!(resumed.game().current().name, "John");
        assert_eq!(resumed.game().players()[0].remaining, 310);

        let record = resumed.submit(&Turn::new([1, 0, 0], false)).unwrap();
        assert_eq!(record.turn_number, 4);
        assert_eq!(record.remaining, 440);
    }
}
