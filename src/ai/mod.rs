//! AI 落子模块：完整 minimax 搜索与按难度混合的随机落子。

pub mod minimax;

pub use minimax::{optimal_move, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy, SearchOutcome};
