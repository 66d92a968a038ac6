//! 游戏核心逻辑模块（棋盘状态、规则引擎、视图指令、会话编排）。

pub mod effects;
pub mod rules;
pub mod session;
pub mod state;

pub use effects::{
    Celebration,
    ColorError,
    EffectEngine,
    EffectStack,
    Rgb,
    ViewEffect,
    CONFETTI_PARTICLES,
    DEFAULT_WIN_SOUND,
};
pub use rules::{RuleEngine, RuleError, RuleResolution};
pub use session::{AiTurn, GameMode, MatchConfig, Session, SessionError};
pub use state::{
    Board,
    CellIndex,
    GameEvent,
    GameState,
    IntegrityError,
    Line,
    Mark,
    Outcome,
    Palette,
    ScoreTally,
    BOARD_SIZE,
    WINNING_LINES,
};
