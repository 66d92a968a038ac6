pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{optimal_move, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy};
pub use game::{
    AiTurn, Board, Celebration, CellIndex, ColorError, EffectEngine, GameEvent, GameMode,
    GameState, IntegrityError, Line, Mark, MatchConfig, Outcome, Palette, Rgb, RuleEngine,
    RuleError, RuleResolution, ScoreTally, Session, SessionError, ViewEffect, WINNING_LINES,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error<E: Serialize + std::fmt::Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClickResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<SessionError>,
    effects: Vec<ViewEffect>,
    needs_ai_move: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkResponse {
    turn: u32,
    decision: AiDecision,
    pending_effects: Vec<ViewEffect>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AiMoveResponse {
    decision: AiDecision,
    effects: Vec<ViewEffect>,
}

fn click_response(session: &Session, result: Result<Vec<ViewEffect>, SessionError>) -> ClickResponse {
    match result {
        Ok(effects) => ClickResponse {
            accepted: true,
            rejection: None,
            effects,
            needs_ai_move: session.needs_ai_move(),
        },
        Err(rejection) => ClickResponse {
            accepted: false,
            rejection: Some(rejection),
            effects: Vec::new(),
            needs_ai_move: session.needs_ai_move(),
        },
    }
}

/// 暴露给前端的一次会话。
#[wasm_bindgen]
pub struct TicTacToe {
    session: Session,
}

#[wasm_bindgen]
impl TicTacToe {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<TicTacToe, JsValue> {
        let config = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => MatchConfig::default(),
        };
        Ok(TicTacToe {
            session: Session::start(config),
        })
    }

    #[wasm_bindgen(js_name = "stateJson")]
    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(self.session.state())
    }

    #[wasm_bindgen(js_name = "tallyJson")]
    pub fn tally_json(&self) -> Result<String, JsValue> {
        to_json(self.session.tally())
    }

    #[wasm_bindgen(js_name = "configJson")]
    pub fn config_json(&self) -> Result<String, JsValue> {
        to_json(self.session.config())
    }

    pub fn redraw(&self) -> Result<String, JsValue> {
        to_json(&self.session.redraw())
    }

    /// 拒绝不会抛错，而是以 `accepted: false` 返回。
    pub fn click(&mut self, index: usize) -> Result<String, JsValue> {
        let result = self.session.click(index);
        to_json(&click_response(&self.session, result))
    }

    #[wasm_bindgen(js_name = "needsAiMove")]
    pub fn needs_ai_move(&self) -> bool {
        self.session.needs_ai_move()
    }

    #[wasm_bindgen(js_name = "applyAiMove")]
    pub fn apply_ai_move(&mut self) -> Result<String, JsValue> {
        let (decision, effects) = self.session.play_ai_turn().map_err(to_js_error)?;
        to_json(&AiMoveResponse { decision, effects })
    }

    /// 开始 AI 回合，延迟后返回决策 JSON，需带上其中的 `turn` 调用 `finishAiTurn` 落子。
    #[wasm_bindgen(js_name = "thinkAi")]
    pub fn think_ai(&mut self) -> Result<Promise, JsValue> {
        let (turn, pending_effects) = self.session.begin_ai_turn().map_err(to_js_error)?;

        Ok(future_to_promise(async move {
            if turn.delay_ms > 0 {
                TimeoutFuture::new(turn.delay_ms).await;
            }
            let decision = turn.decide();
            crate::console_log!("ai {} picked {:?} after {} ms", turn.ai_mark, decision.cell, turn.delay_ms);
            let json = to_json(&ThinkResponse {
                turn: turn.turn,
                decision,
                pending_effects,
            })?;
            Ok(JsValue::from_str(&json))
        }))
    }

    #[wasm_bindgen(js_name = "finishAiTurn")]
    pub fn finish_ai_turn(&mut self, turn: u32, index: usize) -> Result<String, JsValue> {
        let effects = self.session.finish_ai_turn(turn, index).map_err(to_js_error)?;
        to_json(&effects)
    }

    #[wasm_bindgen(js_name = "newRound")]
    pub fn new_round(&mut self) -> Result<String, JsValue> {
        to_json(&self.session.new_round())
    }

    #[wasm_bindgen(js_name = "backToLanding")]
    pub fn back_to_landing(&mut self) -> Result<String, JsValue> {
        to_json(&self.session.back_to_landing())
    }
}

/// 对任意棋盘求结果。
#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&board.evaluate()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateBoard")]
pub fn validate_board(board: JsValue) -> Result<(), JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    board.integrity_check().map_err(to_js_error)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    board: JsValue,
    ai_mark: String,
    difficulty: Option<String>,
    seed: Option<u32>,
) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let ai_mark = Mark::from_str(&ai_mark)
        .map_err(|_| JsValue::from_str(&format!("unknown mark '{ai_mark}'")))?;
    let difficulty = difficulty
        .as_deref()
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or_default();
    let config = AiConfig::from_difficulty(difficulty);
    let mut agent = match seed {
        Some(seed) => AiAgent::with_seed(config, u64::from(seed)),
        None => AiAgent::new(config),
    };
    let decision = agent.decide(&board, ai_mark);
    to_value(&decision).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "parseColor")]
pub fn parse_color(hex: &str) -> Result<JsValue, JsValue> {
    let rgb = Rgb::from_hex(hex).map_err(to_js_error)?;
    to_value(&rgb).map_err(JsValue::from)
}
