use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ai::{AiAgent, AiConfig, AiDecision, AiDifficulty};
use crate::{console_log, console_warn};

use super::effects::{EffectEngine, ViewEffect, DEFAULT_WIN_SOUND};
use super::rules::{RuleEngine, RuleError, RuleResolution};
use super::state::{Board, CellIndex, GameEvent, GameState, Mark, Outcome, Palette, ScoreTally};

const DEFAULT_THINK_DELAY_MS: u32 = 250;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Pvp,
    Ai,
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pvp" | "human" | "local" => Ok(GameMode::Pvp),
            "ai" | "cpu" | "computer" => Ok(GameMode::Ai),
            _ => Err(()),
        }
    }
}

/// 开局配置，整局不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchConfig {
    pub mode: GameMode,
    pub ai_mark: Mark,
    /// 玩家选边，设置后覆盖 `ai_mark`。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_side: Option<Mark>,
    pub difficulty: AiDifficulty,
    pub palette: Palette,
    pub think_delay_ms: u32,
    pub win_sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl MatchConfig {
    pub fn pvp() -> Self {
        Self::default()
    }

    pub fn versus_ai(difficulty: AiDifficulty) -> Self {
        Self {
            mode: GameMode::Ai,
            difficulty,
            ..Self::default()
        }
    }

    pub fn with_human_side(mut self, side: Mark) -> Self {
        self.human_side = Some(side);
        self.ai_mark = side.opponent();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 人人对战时为 `None`。
    pub fn ai_mark(&self) -> Option<Mark> {
        match self.mode {
            GameMode::Pvp => None,
            GameMode::Ai => Some(self.human_side.map(Mark::opponent).unwrap_or(self.ai_mark)),
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Pvp,
            ai_mark: Mark::O,
            human_side: None,
            difficulty: AiDifficulty::Medium,
            palette: Palette::default(),
            think_delay_ms: DEFAULT_THINK_DELAY_MS,
            win_sound: Some(DEFAULT_WIN_SOUND.to_string()),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum SessionError {
    #[error("{error}")]
    Rule {
        #[from]
        error: RuleError,
    },
    #[error("the AI is still thinking")]
    AiBusy,
    #[error("it is the AI's turn ({mark})")]
    NotHumanTurn { mark: Mark },
    #[error("it is the human's turn ({mark})")]
    NotAiTurn { mark: Mark },
    #[error("this match has no AI opponent")]
    NoAiOpponent,
    #[error("no AI turn is pending")]
    NoAiTurnPending,
    #[error("AI turn {turn} is no longer current")]
    StaleAiTurn { turn: u32 },
    #[error("no empty cell left for the AI")]
    NoMoveAvailable,
}

/// AI 回合的快照，可以脱离会话单独搜索。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiTurn {
    pub turn: u32,
    pub board: Board,
    pub ai_mark: Mark,
    pub difficulty: AiDifficulty,
    pub seed: u64,
    pub delay_ms: u32,
}

impl AiTurn {
    pub fn decide(&self) -> AiDecision {
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(self.difficulty), self.seed);
        agent.decide(&self.board, self.ai_mark)
    }
}

/// 一次会话：从开局配置到回到首页，比分在多局之间保留。
pub struct Session {
    config: MatchConfig,
    engine: RuleEngine,
    tally: ScoreTally,
    agent: AiAgent,
    seeds: SmallRng,
    turn_counter: u32,
    pending_turn: Option<u32>,
}

impl Session {
    pub fn start(config: MatchConfig) -> Self {
        let ai_config = AiConfig::from_difficulty(config.difficulty);
        let (agent, seeds) = match config.seed {
            Some(seed) => (
                AiAgent::with_seed(ai_config, seed),
                SmallRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (AiAgent::new(ai_config), SmallRng::from_entropy()),
        };

        console_log!(
            "match started: mode={:?} ai={:?} difficulty={:?}",
            config.mode,
            config.ai_mark(),
            config.difficulty
        );

        Self {
            config,
            engine: RuleEngine::new(),
            tally: ScoreTally::default(),
            agent,
            seeds,
            turn_counter: 0,
            pending_turn: None,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        self.engine.state()
    }

    pub fn tally(&self) -> &ScoreTally {
        &self.tally
    }

    pub fn ai_pending(&self) -> bool {
        self.pending_turn.is_some()
    }

    fn is_ai_turn(&self) -> bool {
        !self.engine.state().is_finished() && self.config.ai_mark() == Some(self.engine.current())
    }

    pub fn needs_ai_move(&self) -> bool {
        !self.ai_pending() && self.is_ai_turn()
    }

    fn input_enabled(&self) -> bool {
        !self.engine.state().is_finished() && !self.ai_pending() && !self.is_ai_turn()
    }

    fn effects_for(&mut self, resolution: &RuleResolution) -> Vec<ViewEffect> {
        match &resolution.outcome {
            Outcome::Won { winner, lines } => {
                self.tally.record(&resolution.outcome);
                console_log!("player {winner} wins on {lines:?}");
            }
            Outcome::Draw => {
                self.tally.record(&resolution.outcome);
                console_log!("match drawn");
            }
            Outcome::Ongoing => {}
        }

        let mut effects = EffectEngine::default();
        effects.queue_events(
            &resolution.events,
            &self.config.palette,
            &self.tally,
            self.config.win_sound.as_deref(),
        );
        effects.resolve_all()
    }

    /// 玩家点击格子。
    pub fn click(&mut self, index: CellIndex) -> Result<Vec<ViewEffect>, SessionError> {
        if self.ai_pending() {
            return Err(SessionError::AiBusy);
        }
        if self.is_ai_turn() {
            return Err(SessionError::NotHumanTurn {
                mark: self.engine.current(),
            });
        }

        let resolution = self.engine.play(index).map_err(|error| {
            console_warn!("move at {index} rejected: {error}");
            SessionError::from(error)
        })?;
        Ok(self.effects_for(&resolution))
    }

    /// 标记 AI 正在思考并禁用输入。同一时间只允许一个 AI 回合。
    pub fn begin_ai_turn(&mut self) -> Result<(AiTurn, Vec<ViewEffect>), SessionError> {
        let ai_mark = self.config.ai_mark().ok_or(SessionError::NoAiOpponent)?;
        if self.ai_pending() {
            return Err(SessionError::AiBusy);
        }
        if self.engine.state().is_finished() {
            return Err(RuleError::GameFinished.into());
        }
        if self.engine.current() != ai_mark {
            return Err(SessionError::NotAiTurn {
                mark: self.engine.current(),
            });
        }

        self.turn_counter = self.turn_counter.wrapping_add(1);
        self.pending_turn = Some(self.turn_counter);
        let turn = AiTurn {
            turn: self.turn_counter,
            board: *self.engine.board(),
            ai_mark,
            difficulty: self.config.difficulty,
            seed: self.seeds.gen(),
            delay_ms: self.config.think_delay_ms,
        };
        Ok((turn, vec![ViewEffect::SetInputEnabled { enabled: false }]))
    }

    /// 落下 AI 选中的格子。`turn` 必须是当前挂起的回合，重开后的旧回合会被拒绝。
    /// 落子失败时 AI 回合保持挂起，可以换一个格子重试。
    pub fn finish_ai_turn(
        &mut self,
        turn: u32,
        index: CellIndex,
    ) -> Result<Vec<ViewEffect>, SessionError> {
        match self.pending_turn {
            None => return Err(SessionError::NoAiTurnPending),
            Some(pending) if pending != turn => return Err(SessionError::StaleAiTurn { turn }),
            Some(_) => {}
        }

        let resolution = self.engine.play(index)?;
        self.pending_turn = None;

        let mut effects = self.effects_for(&resolution);
        if !resolution.is_terminal() {
            effects.push(ViewEffect::SetInputEnabled { enabled: true });
        }
        Ok(effects)
    }

    /// 同步完成一个 AI 回合：开始、搜索、落子。
    pub fn play_ai_turn(&mut self) -> Result<(AiDecision, Vec<ViewEffect>), SessionError> {
        let (turn, mut effects) = self.begin_ai_turn()?;
        let decision = self.agent.decide(&turn.board, turn.ai_mark);
        console_log!(
            "ai {} picked {:?} via {:?} ({} nodes)",
            turn.ai_mark,
            decision.cell,
            decision.strategy,
            decision.nodes
        );

        let Some(cell) = decision.cell else {
            self.pending_turn = None;
            return Err(SessionError::NoMoveAvailable);
        };
        effects.extend(self.finish_ai_turn(turn.turn, cell)?);
        Ok((decision, effects))
    }

    /// 清空棋盘，`preserve_score` 为假时比分一并清零。
    pub fn reset(&mut self, preserve_score: bool) -> Vec<ViewEffect> {
        self.engine.reset();
        if let Some(turn) = self.pending_turn.take() {
            console_warn!("ai turn {turn} dropped by reset");
        }
        if !preserve_score {
            self.tally.reset();
        }

        let mut effects = EffectEngine::default();
        effects.queue_events(
            &[GameEvent::MatchReset],
            &self.config.palette,
            &self.tally,
            self.config.win_sound.as_deref(),
        );
        let mut resolved = effects.resolve_all();
        if self.is_ai_turn() {
            resolved.retain(|effect| !matches!(effect, ViewEffect::SetInputEnabled { .. }));
            resolved.push(ViewEffect::SetInputEnabled { enabled: false });
        }
        resolved
    }

    pub fn new_round(&mut self) -> Vec<ViewEffect> {
        self.reset(true)
    }

    pub fn back_to_landing(&mut self) -> Vec<ViewEffect> {
        console_log!("session closed with tally {:?}", self.tally);
        self.reset(false)
    }

    /// 按当前状态重画整个视图。
    pub fn redraw(&self) -> Vec<ViewEffect> {
        let state = self.engine.state();
        let palette = &self.config.palette;
        let mut effects = EffectEngine::default();

        effects.queue(ViewEffect::ClearBoard);
        for (index, cell) in state.board.cells().iter().enumerate() {
            if let Some(mark) = cell {
                effects.queue(ViewEffect::RenderCell {
                    index,
                    mark: *mark,
                    color: palette.color_for(*mark).to_string(),
                });
            }
        }

        let text = match &state.outcome {
            Outcome::Won { winner, lines } => {
                effects.queue(ViewEffect::HighlightLines {
                    lines: lines.clone(),
                    color: palette.color_for(*winner).to_string(),
                });
                super::effects::win_status(*winner)
            }
            Outcome::Draw => super::effects::DRAW_STATUS.to_string(),
            Outcome::Ongoing => super::effects::turn_status(state.current),
        };
        effects.queue(ViewEffect::ReportStatus { text });
        effects.queue(ViewEffect::UpdateScore { tally: self.tally });
        effects.queue(ViewEffect::SetInputEnabled {
            enabled: self.input_enabled(),
        });
        effects.resolve_all()
    }
}
