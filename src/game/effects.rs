use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::state::{CellIndex, GameEvent, Line, Mark, Palette, ScoreTally};

/// 胜利时默认播放的音效。
pub const DEFAULT_WIN_SOUND: &str = "assets/sounds/win.mp3";
/// 每次庆祝发射的彩纸数量。
pub const CONFETTI_PARTICLES: u16 = 180;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum ColorError {
    #[error("color '{value}' must start with '#'")]
    MissingHash { value: String },
    #[error("color '{value}' must have 3 or 6 hex digits")]
    InvalidLength { value: String },
    #[error("color '{value}' contains a non-hex digit")]
    InvalidDigit { value: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// 解析 `#rrggbb` 或 `#rgb`。
    pub fn from_hex(value: &str) -> Result<Rgb, ColorError> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| ColorError::MissingHash {
                value: value.to_string(),
            })?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::InvalidDigit {
                value: value.to_string(),
            });
        }

        let expanded = match digits.len() {
            6 => digits.to_string(),
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            _ => {
                return Err(ColorError::InvalidLength {
                    value: value.to_string(),
                })
            }
        };
        let packed = u32::from_str_radix(&expanded, 16).map_err(|_| ColorError::InvalidDigit {
            value: value.to_string(),
        })?;

        Ok(Rgb {
            r: ((packed >> 16) & 0xff) as u8,
            g: ((packed >> 8) & 0xff) as u8,
            b: (packed & 0xff) as u8,
        })
    }
}

/// 胜利庆祝的参数，动画本身由前端负责。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Celebration {
    pub color: String,
    pub rgb: Rgb,
    pub particles: u16,
}

impl Celebration {
    /// 颜色无法解析时退回金色。
    pub fn for_color(color: &str) -> Self {
        let rgb = Rgb::from_hex(color).unwrap_or(Rgb {
            r: 0xff,
            g: 0xd1,
            b: 0x66,
        });
        Self {
            color: color.to_string(),
            rgb,
            particles: CONFETTI_PARTICLES,
        }
    }
}

/// 交给视图层执行的指令。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewEffect {
    ClearBoard,
    RenderCell {
        index: CellIndex,
        mark: Mark,
        color: String,
    },
    HighlightLines {
        lines: Vec<Line>,
        color: String,
    },
    ReportStatus {
        text: String,
    },
    UpdateScore {
        tally: ScoreTally,
    },
    #[serde(rename_all = "camelCase")]
    PlayWinEffect {
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        celebration: Celebration,
    },
    SetInputEnabled {
        enabled: bool,
    },
}

impl ViewEffect {
    /// 数值越大越先执行。
    pub fn priority(&self) -> i8 {
        match self {
            ViewEffect::ClearBoard => 6,
            ViewEffect::RenderCell { .. } => 5,
            ViewEffect::HighlightLines { .. } => 4,
            ViewEffect::ReportStatus { .. } => 3,
            ViewEffect::UpdateScore { .. } => 2,
            ViewEffect::PlayWinEffect { .. } => 1,
            ViewEffect::SetInputEnabled { .. } => 0,
        }
    }
}

pub fn turn_status(mark: Mark) -> String {
    format!("Player {mark}’s turn")
}

pub fn win_status(mark: Mark) -> String {
    format!("Player {mark} wins! 🎉")
}

pub const DRAW_STATUS: &str = "It’s a draw.";

#[derive(Debug, Clone)]
struct StackItem {
    priority: i8,
    order: u64,
    effect: ViewEffect,
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.order == other.order
    }
}

impl Eq for StackItem {}

impl PartialOrd for StackItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StackItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// 按优先级出栈，同优先级先进先出。
#[derive(Default)]
pub struct EffectStack {
    heap: BinaryHeap<StackItem>,
    order: u64,
}

impl EffectStack {
    pub fn push(&mut self, effect: ViewEffect) {
        self.order += 1;
        self.heap.push(StackItem {
            priority: effect.priority(),
            order: self.order,
            effect,
        });
    }

    fn pop(&mut self) -> Option<StackItem> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// 把规则事件翻译成视图指令。
#[derive(Default)]
pub struct EffectEngine {
    stack: EffectStack,
}

impl EffectEngine {
    pub fn queue(&mut self, effect: ViewEffect) {
        self.stack.push(effect);
    }

    /// `tally` 应为已计入本次结果后的比分。
    pub fn queue_events(
        &mut self,
        events: &[GameEvent],
        palette: &Palette,
        tally: &ScoreTally,
        win_sound: Option<&str>,
    ) {
        for event in events {
            match event {
                GameEvent::MovePlayed { mark, index } => self.queue(ViewEffect::RenderCell {
                    index: *index,
                    mark: *mark,
                    color: palette.color_for(*mark).to_string(),
                }),
                GameEvent::TurnPassed { next } => self.queue(ViewEffect::ReportStatus {
                    text: turn_status(*next),
                }),
                GameEvent::GameWon { winner, lines } => {
                    let color = palette.color_for(*winner);
                    self.queue(ViewEffect::HighlightLines {
                        lines: lines.clone(),
                        color: color.to_string(),
                    });
                    self.queue(ViewEffect::ReportStatus {
                        text: win_status(*winner),
                    });
                    self.queue(ViewEffect::UpdateScore { tally: *tally });
                    self.queue(ViewEffect::PlayWinEffect {
                        audio: win_sound.map(str::to_string),
                        celebration: Celebration::for_color(color),
                    });
                    self.queue(ViewEffect::SetInputEnabled { enabled: false });
                }
                GameEvent::GameDrawn => {
                    self.queue(ViewEffect::ReportStatus {
                        text: DRAW_STATUS.to_string(),
                    });
                    self.queue(ViewEffect::UpdateScore { tally: *tally });
                    self.queue(ViewEffect::SetInputEnabled { enabled: false });
                }
                GameEvent::MatchReset => {
                    self.queue(ViewEffect::ClearBoard);
                    self.queue(ViewEffect::ReportStatus {
                        text: turn_status(Mark::X),
                    });
                    self.queue(ViewEffect::UpdateScore { tally: *tally });
                    self.queue(ViewEffect::SetInputEnabled { enabled: true });
                }
            }
        }
    }

    pub fn resolve_all(&mut self) -> Vec<ViewEffect> {
        let mut effects = Vec::with_capacity(self.stack.len());
        while let Some(item) = self.stack.pop() {
            effects.push(item.effect);
        }
        effects
    }

    pub fn stack(&self) -> &EffectStack {
        &self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(
            Rgb::from_hex("#8ecae6"),
            Ok(Rgb {
                r: 142,
                g: 202,
                b: 230
            })
        );
        assert_eq!(Rgb::from_hex("#fff"), Ok(Rgb { r: 255, g: 255, b: 255 }));
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(matches!(
            Rgb::from_hex("8ecae6"),
            Err(ColorError::MissingHash { .. })
        ));
        assert!(matches!(
            Rgb::from_hex("#8eca"),
            Err(ColorError::InvalidLength { .. })
        ));
        assert!(matches!(
            Rgb::from_hex("#8ecaeg"),
            Err(ColorError::InvalidDigit { .. })
        ));
    }

    #[test]
    fn celebration_falls_back_to_gold() {
        let celebration = Celebration::for_color("not-a-color");
        assert_eq!(celebration.rgb, Rgb { r: 255, g: 209, b: 102 });
        assert_eq!(celebration.particles, CONFETTI_PARTICLES);
    }

    #[test]
    fn win_effects_come_out_in_display_order() {
        let mut engine = EffectEngine::default();
        let palette = Palette::default();
        let tally = ScoreTally { x: 1, o: 0, draws: 0 };
        engine.queue_events(
            &[
                GameEvent::MovePlayed {
                    mark: Mark::X,
                    index: 2,
                },
                GameEvent::GameWon {
                    winner: Mark::X,
                    lines: vec![[0, 1, 2]],
                },
            ],
            &palette,
            &tally,
            Some(DEFAULT_WIN_SOUND),
        );
        let effects = engine.resolve_all();

        let kinds: Vec<i8> = effects.iter().map(ViewEffect::priority).collect();
        assert_eq!(kinds, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(
            effects[0],
            ViewEffect::RenderCell {
                index: 2,
                mark: Mark::X,
                color: "#8ecae6".to_string(),
            }
        );
        assert_eq!(
            effects[2],
            ViewEffect::ReportStatus {
                text: "Player X wins! 🎉".to_string()
            }
        );
        match &effects[4] {
            ViewEffect::PlayWinEffect { audio, celebration } => {
                assert_eq!(audio.as_deref(), Some(DEFAULT_WIN_SOUND));
                assert_eq!(celebration.color, "#8ecae6");
            }
            other => panic!("unexpected effect {other:?}"),
        }
        assert!(engine.stack().is_empty());
    }

    #[test]
    fn same_priority_effects_keep_insertion_order() {
        let mut engine = EffectEngine::default();
        for index in [4, 0, 8] {
            engine.queue(ViewEffect::RenderCell {
                index,
                mark: Mark::O,
                color: "#000".to_string(),
            });
        }
        let order: Vec<CellIndex> = engine
            .resolve_all()
            .into_iter()
            .filter_map(|effect| match effect {
                ViewEffect::RenderCell { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![4, 0, 8]);
    }

    #[test]
    fn effects_serialize_with_camel_case_tags() {
        let json = serde_json::to_value(ViewEffect::SetInputEnabled { enabled: false })
            .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"type": "setInputEnabled", "enabled": false})
        );
    }
}
