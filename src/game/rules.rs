use serde::{Deserialize, Serialize};

use super::state::{Board, CellIndex, GameEvent, GameState, IntegrityError, Mark, Outcome};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("cell {index} is outside the board")]
    OutOfRange { index: CellIndex },
    #[error("cell {index} is already taken by {mark}")]
    Occupied { index: CellIndex, mark: Mark },
    #[error("the match is already over")]
    GameFinished,
    #[error("integrity violation: {error}")]
    IntegrityViolation { error: IntegrityError },
}

/// 一次落子的完整结算结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    pub outcome: Outcome,
}

impl RuleResolution {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

/// 规则引擎，独占棋盘与轮次。
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    state: GameState,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            state: GameState::new(),
        }
    }

    /// 从已有状态恢复，先做一致性检查。
    pub fn from_state(state: GameState) -> Result<Self, RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })?;
        Ok(Self { state })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn board(&self) -> &Board {
        &self.state.board
    }

    pub fn current(&self) -> Mark {
        self.state.current
    }

    fn ensure_not_finished(&self) -> Result<(), RuleError> {
        if self.state.is_finished() || self.state.board.evaluate().is_terminal() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_vacant(&self, index: CellIndex) -> Result<(), RuleError> {
        if !Board::in_bounds(index) {
            return Err(RuleError::OutOfRange { index });
        }
        if let Some(mark) = self.state.board.get(index) {
            return Err(RuleError::Occupied { index, mark });
        }
        Ok(())
    }

    /// 用当前轮次的棋子占据 `index`，不结算也不换手。
    pub fn apply_move(&mut self, index: CellIndex) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_not_finished()?;
        self.ensure_vacant(index)?;

        let mark = self.state.current;
        self.state.board.place(index, mark);

        let event = GameEvent::MovePlayed { mark, index };
        self.state.record_event(event.clone());
        Ok(vec![event])
    }

    pub fn evaluate(&self) -> Outcome {
        self.state.board.evaluate()
    }

    pub fn advance_turn(&mut self) -> Result<Mark, RuleError> {
        self.ensure_not_finished()?;
        self.state.current = self.state.current.opponent();
        self.state.record_event(GameEvent::TurnPassed {
            next: self.state.current,
        });
        Ok(self.state.current)
    }

    pub fn reset(&mut self) {
        self.state = GameState::new();
        self.state.record_event(GameEvent::MatchReset);
    }

    /// 落子、结算，未结束则换手。
    pub fn play(&mut self, index: CellIndex) -> Result<RuleResolution, RuleError> {
        let mut events = self.apply_move(index)?;

        let outcome = self.evaluate();
        match &outcome {
            Outcome::Won { winner, lines } => {
                let event = GameEvent::GameWon {
                    winner: *winner,
                    lines: lines.clone(),
                };
                self.state.record_event(event.clone());
                events.push(event);
            }
            Outcome::Draw => {
                self.state.record_event(GameEvent::GameDrawn);
                events.push(GameEvent::GameDrawn);
            }
            Outcome::Ongoing => {
                let next = self.advance_turn()?;
                events.push(GameEvent::TurnPassed { next });
            }
        }
        self.state.outcome = outcome.clone();

        Ok(RuleResolution {
            state: self.state.clone(),
            events,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::BOARD_SIZE;

    fn play_all(engine: &mut RuleEngine, moves: &[CellIndex]) -> RuleResolution {
        let mut last = None;
        for &index in moves {
            last = Some(engine.play(index).expect("move should be legal"));
        }
        last.expect("at least one move")
    }

    #[test]
    fn top_row_sequence_wins_for_x() {
        let mut engine = RuleEngine::new();
        let resolution = play_all(&mut engine, &[0, 4, 1, 7, 2]);

        assert_eq!(
            resolution.outcome,
            Outcome::Won {
                winner: Mark::X,
                lines: vec![[0, 1, 2]],
            }
        );
        assert!(resolution.is_terminal());
        assert!(resolution
            .events
            .iter()
            .any(|event| matches!(event, GameEvent::GameWon { winner: Mark::X, .. })));
        assert_eq!(engine.current(), Mark::X, "turn does not pass after a win");
    }

    #[test]
    fn turns_alternate_starting_with_x() {
        let mut engine = RuleEngine::new();
        assert_eq!(engine.current(), Mark::X);

        let resolution = engine.play(4).expect("legal");
        assert_eq!(engine.current(), Mark::O);
        assert_eq!(
            resolution.events,
            vec![
                GameEvent::MovePlayed {
                    mark: Mark::X,
                    index: 4
                },
                GameEvent::TurnPassed { next: Mark::O },
            ]
        );

        engine.play(0).expect("legal");
        assert_eq!(engine.current(), Mark::X);
        assert_eq!(engine.board().get(0), Some(Mark::O));
    }

    #[test]
    fn occupied_and_out_of_range_moves_are_rejected() {
        let mut engine = RuleEngine::new();
        engine.play(3).expect("legal");

        assert_eq!(
            engine.play(3).unwrap_err(),
            RuleError::Occupied {
                index: 3,
                mark: Mark::X
            }
        );
        assert_eq!(engine.play(9).unwrap_err(), RuleError::OutOfRange { index: 9 });
        assert_eq!(engine.current(), Mark::O, "rejections leave the turn alone");
        assert_eq!(engine.board().count(Mark::O), 0);
    }

    #[test]
    fn no_moves_after_the_match_ends() {
        let mut engine = RuleEngine::new();
        play_all(&mut engine, &[0, 3, 1, 4, 2]);

        assert_eq!(engine.play(8).unwrap_err(), RuleError::GameFinished);
        assert_eq!(engine.play(0).unwrap_err(), RuleError::GameFinished);
        assert_eq!(engine.play(9).unwrap_err(), RuleError::GameFinished);
        assert_eq!(engine.apply_move(8).unwrap_err(), RuleError::GameFinished);
        assert_eq!(engine.advance_turn().unwrap_err(), RuleError::GameFinished);
        assert!(engine.board().is_vacant(8));
    }

    /// 遍历所有合法对局，返回 (节点数, 终局数)。
    fn walk_every_game(engine: &RuleEngine, totals: &mut (usize, usize)) {
        totals.0 += 1;
        let state = engine.state();
        assert!(state.integrity_check().is_ok(), "inconsistent board {}", state.board);

        match &state.outcome {
            Outcome::Won { winner, lines } => {
                assert!(!lines.is_empty());
                for line in lines {
                    assert!(
                        line.iter().all(|&index| state.board.get(index) == Some(*winner)),
                        "line {line:?} not held by {winner} on {}",
                        state.board
                    );
                }
                assert!(state.board.winning_lines_for(winner.opponent()).is_empty());
            }
            Outcome::Draw => assert!(state.board.is_full()),
            Outcome::Ongoing => assert!(!state.board.is_full()),
        }

        if state.is_finished() {
            totals.1 += 1;
            let mut finished = engine.clone();
            for index in 0..BOARD_SIZE {
                assert_eq!(finished.play(index).unwrap_err(), RuleError::GameFinished);
            }
            assert_eq!(finished.board(), engine.board());
            return;
        }

        for index in state.board.available_moves() {
            let mut next = engine.clone();
            let resolution = next.play(index).expect("vacant cell on an ongoing board");
            assert_eq!(resolution.outcome, next.state().outcome);
            walk_every_game(&next, totals);
        }
    }

    #[test]
    fn every_legal_sequence_keeps_the_board_consistent() {
        let mut totals = (0, 0);
        walk_every_game(&RuleEngine::new(), &mut totals);
        assert_eq!(totals, (549_946, 255_168));
    }

    #[test]
    fn full_board_ends_in_draw() {
        let mut engine = RuleEngine::new();
        // X O X / X O O / O X X
        let resolution = play_all(&mut engine, &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(resolution.outcome, Outcome::Draw);
        assert!(resolution.events.contains(&GameEvent::GameDrawn));
        assert!(engine.state().is_finished());
    }

    #[test]
    fn apply_move_and_advance_turn_are_separate_steps() {
        let mut engine = RuleEngine::new();
        engine.apply_move(0).expect("legal");
        assert_eq!(engine.current(), Mark::X);
        assert_eq!(engine.evaluate(), Outcome::Ongoing);

        assert_eq!(engine.advance_turn(), Ok(Mark::O));
        engine.apply_move(1).expect("legal");
        assert_eq!(engine.board().get(1), Some(Mark::O));
    }

    #[test]
    fn reset_clears_board_and_turn() {
        let mut engine = RuleEngine::new();
        play_all(&mut engine, &[0, 3, 1, 4, 2]);

        engine.reset();
        assert!(engine.board().is_empty());
        assert_eq!(engine.current(), Mark::X);
        assert_eq!(engine.state().outcome, Outcome::Ongoing);
        assert_eq!(engine.state().event_log, vec![GameEvent::MatchReset]);
        engine.play(8).expect("board is playable again");
    }

    #[test]
    fn from_state_rejects_inconsistent_snapshots() {
        let mut state = GameState::new();
        state.board = "OO./.../...".parse().expect("parse");
        assert!(matches!(
            RuleEngine::from_state(state),
            Err(RuleError::IntegrityViolation { .. })
        ));

        let resumed = GameState::from_board("X../.O./...".parse().expect("parse"));
        let engine = RuleEngine::from_state(resumed).expect("consistent");
        assert_eq!(engine.current(), Mark::X);
    }
}
