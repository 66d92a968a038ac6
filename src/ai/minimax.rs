use std::str::FromStr;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::{Board, CellIndex, Mark, Outcome};

/// 胜负分的基准，越早赢分越高。
const WIN_SCORE: i32 = 10;

#[derive(Debug, Clone, Copy)]
struct SearchClock {
    #[cfg(target_arch = "wasm32")]
    timestamp: f64,
    #[cfg(not(target_arch = "wasm32"))]
    instant: std::time::Instant,
}

impl SearchClock {
    #[cfg(target_arch = "wasm32")]
    fn now() -> Self {
        Self {
            timestamp: web_sys::js_sys::Date::now(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now() -> Self {
        Self {
            instant: std::time::Instant::now(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn elapsed(&self) -> Duration {
        let elapsed_ms = web_sys::js_sys::Date::now() - self.timestamp;
        Duration::from_millis(elapsed_ms.max(0.0) as u64)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }
}

/// 本次落子由哪种原语产生。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    Random,
    Optimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    #[serde(alias = "normal")]
    Medium,
    #[serde(alias = "impossible", alias = "expert")]
    Hard,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "medium" | "normal" => Ok(AiDifficulty::Medium),
            "hard" | "impossible" | "expert" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    /// 每次调用走完整搜索的概率，其余情况随机落子。
    pub optimal_probability: f64,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        let optimal_probability = match difficulty {
            AiDifficulty::Easy => 0.0,
            AiDifficulty::Medium => 0.6,
            AiDifficulty::Hard => 1.0,
        };
        Self {
            difficulty,
            optimal_probability,
        }
    }

    pub fn with_optimal_probability(mut self, probability: f64) -> Self {
        self.optimal_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Medium)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellIndex>,
    pub strategy: AiStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<i32>,
    pub nodes: u64,
    pub depth_reached: u8,
    pub duration_ms: u64,
}

/// 完整搜索的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub score: i32,
    pub cell: Option<CellIndex>,
    pub nodes: u64,
    pub depth_reached: u8,
}

struct SearchStats {
    nodes: u64,
    depth_reached: u8,
}

impl SearchStats {
    fn new() -> Self {
        Self {
            nodes: 0,
            depth_reached: 0,
        }
    }
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 只在没有空格时返回 `None`。
    pub fn select_move(&mut self, board: &Board, ai_mark: Mark) -> Option<CellIndex> {
        self.decide(board, ai_mark).cell
    }

    pub fn decide(&mut self, board: &Board, ai_mark: Mark) -> AiDecision {
        let start = SearchClock::now();

        let use_optimal = match self.config.optimal_probability {
            p if p >= 1.0 => true,
            p if p <= 0.0 => false,
            p => self.rng.gen_bool(p),
        };

        if !use_optimal {
            return self.random_decision(board, start);
        }

        let result = optimal_move(board, ai_mark);
        AiDecision {
            cell: result.cell,
            strategy: AiStrategy::Optimal,
            evaluation: result.cell.map(|_| result.score),
            nodes: result.nodes,
            depth_reached: result.depth_reached,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn random_decision(&mut self, board: &Board, start: SearchClock) -> AiDecision {
        let moves = board.available_moves();
        let cell = moves.choose(&mut self.rng).copied();
        AiDecision {
            cell,
            strategy: AiStrategy::Random,
            evaluation: None,
            nodes: 0,
            depth_reached: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// 完整 minimax，AI 在根节点行棋。调用方的棋盘不会被修改。
pub fn optimal_move(board: &Board, ai_mark: Mark) -> SearchOutcome {
    let mut stats = SearchStats::new();
    let (score, cell) = minimax_rec(*board, 0, true, ai_mark, &mut stats);
    SearchOutcome {
        score,
        cell,
        nodes: stats.nodes,
        depth_reached: stats.depth_reached,
    }
}

fn terminal_score(outcome: &Outcome, depth: u8, ai_mark: Mark) -> Option<i32> {
    match outcome {
        Outcome::Won { winner, .. } if *winner == ai_mark => Some(WIN_SCORE - depth as i32),
        Outcome::Won { .. } => Some(depth as i32 - WIN_SCORE),
        Outcome::Draw => Some(0),
        Outcome::Ongoing => None,
    }
}

fn minimax_rec(
    board: Board,
    depth: u8,
    ai_turn: bool,
    ai_mark: Mark,
    stats: &mut SearchStats,
) -> (i32, Option<CellIndex>) {
    stats.nodes += 1;
    if depth > stats.depth_reached {
        stats.depth_reached = depth;
    }

    if let Some(score) = terminal_score(&board.evaluate(), depth, ai_mark) {
        return (score, None);
    }

    let moves = board.available_moves();
    let mover = if ai_turn { ai_mark } else { ai_mark.opponent() };
    let mut best_score = if ai_turn { i32::MIN } else { i32::MAX };
    let mut best_cell = moves.first().copied();

    for cell in moves {
        let child = board.with_move(cell, mover);
        let (score, _) = minimax_rec(child, depth + 1, !ai_turn, ai_mark, stats);
        let improves = if ai_turn {
            score > best_score
        } else {
            score < best_score
        };
        if improves {
            best_score = score;
            best_cell = Some(cell);
        }
    }

    (best_score, best_cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::RuleEngine;

    fn board(text: &str) -> Board {
        text.parse().expect("board literal should parse")
    }

    fn hard_agent() -> AiAgent {
        AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Hard), 7)
    }

    #[test]
    fn no_move_on_a_full_board() {
        let full = board("XOX/OXO/OXO");
        for difficulty in [AiDifficulty::Easy, AiDifficulty::Medium, AiDifficulty::Hard] {
            let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(difficulty), 1);
            assert_eq!(agent.select_move(&full, Mark::O), None);
        }
    }

    #[test]
    fn hard_takes_the_immediate_win() {
        // X 同时威胁 2 号和 5 号格，O 在 2 号格直接获胜。
        let position = board("OO./XX./X..");
        let decision = hard_agent().decide(&position, Mark::O);
        assert_eq!(decision.cell, Some(2));
        assert_eq!(decision.strategy, AiStrategy::Optimal);
        assert_eq!(decision.evaluation, Some(WIN_SCORE - 1));
    }

    #[test]
    fn hard_blocks_the_opponent() {
        let position = board("XX./.O./...");
        assert_eq!(hard_agent().select_move(&position, Mark::O), Some(2));
    }

    #[test]
    fn search_leaves_the_callers_board_alone() {
        let position = board("X../.O./...");
        let before = position;
        let result = optimal_move(&position, Mark::X);
        assert_eq!(position, before);
        assert!(result.cell.is_some());
        assert!(result.nodes > 1);
    }

    #[test]
    fn empty_board_is_a_draw_with_perfect_play() {
        let result = optimal_move(&Board::new(), Mark::X);
        assert_eq!(result.score, 0);
        assert_eq!(result.depth_reached, 9);
    }

    fn assert_hard_never_loses(engine: &RuleEngine, ai_mark: Mark, agent: &mut AiAgent) {
        let state = engine.state();
        if state.is_finished() {
            assert_ne!(
                state.outcome.winner(),
                Some(ai_mark.opponent()),
                "opponent won on {}",
                state.board
            );
            return;
        }

        if state.current == ai_mark {
            let cell = agent
                .select_move(&state.board, ai_mark)
                .expect("ongoing board has a move");
            let mut next = engine.clone();
            next.play(cell).expect("ai move is legal");
            assert_hard_never_loses(&next, ai_mark, agent);
        } else {
            for cell in state.board.available_moves() {
                let mut next = engine.clone();
                next.play(cell).expect("opponent move is legal");
                assert_hard_never_loses(&next, ai_mark, agent);
            }
        }
    }

    #[test]
    fn hard_as_second_mover_never_loses_to_any_line() {
        let mut agent = hard_agent();
        assert_hard_never_loses(&RuleEngine::new(), Mark::O, &mut agent);
    }

    #[test]
    fn hard_against_hard_is_a_draw() {
        let mut engine = RuleEngine::new();
        let mut x_agent = hard_agent();
        let mut o_agent = hard_agent();
        while !engine.state().is_finished() {
            let mover = engine.current();
            let agent = if mover == Mark::X {
                &mut x_agent
            } else {
                &mut o_agent
            };
            let cell = agent
                .select_move(engine.board(), mover)
                .expect("ongoing board has a move");
            engine.play(cell).expect("legal");
        }
        assert_eq!(engine.state().outcome, Outcome::Draw);
    }

    #[test]
    fn easy_picks_both_remaining_cells_evenly() {
        let position = board("XOX/OOX/X..");
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Easy), 42);
        let mut picks = [0u32; 9];
        for _ in 0..1000 {
            let cell = agent.select_move(&position, Mark::O).expect("two empty cells");
            picks[cell] += 1;
        }
        assert_eq!(picks[7] + picks[8], 1000);
        assert!((400..=600).contains(&picks[7]), "cell 7 picked {} times", picks[7]);
        assert!((400..=600).contains(&picks[8]), "cell 8 picked {} times", picks[8]);
    }

    #[test]
    fn medium_mixes_both_primitives() {
        let position = board("XX./.O./...");
        let mut agent = AiAgent::with_seed(AiConfig::from_difficulty(AiDifficulty::Medium), 3);
        let mut optimal = 0;
        for _ in 0..500 {
            let decision = agent.decide(&position, Mark::O);
            if decision.strategy == AiStrategy::Optimal {
                assert_eq!(decision.cell, Some(2));
                optimal += 1;
            }
        }
        assert!((240..=360).contains(&optimal), "optimal chosen {optimal} times");
    }

    #[test]
    fn seeded_agents_are_deterministic() {
        let position = Board::new();
        let config = AiConfig::from_difficulty(AiDifficulty::Easy);
        let mut first = AiAgent::with_seed(config.clone(), 99);
        let mut second = AiAgent::with_seed(config, 99);
        for _ in 0..20 {
            assert_eq!(
                first.select_move(&position, Mark::X),
                second.select_move(&position, Mark::X)
            );
        }
    }

    #[test]
    fn difficulty_parses_loose_names() {
        assert_eq!("Easy".parse(), Ok(AiDifficulty::Easy));
        assert_eq!("normal".parse(), Ok(AiDifficulty::Medium));
        assert_eq!("impossible".parse(), Ok(AiDifficulty::Hard));
        assert_eq!("brutal".parse::<AiDifficulty>(), Err(()));
    }

    #[test]
    fn optimal_probability_is_clamped() {
        let config = AiConfig::from_difficulty(AiDifficulty::Easy).with_optimal_probability(3.0);
        assert_eq!(config.optimal_probability, 1.0);
    }
}
