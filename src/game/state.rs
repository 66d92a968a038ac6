use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

/// 棋盘格子下标，0..=8，按行优先排列。
pub type CellIndex = usize;
/// 一条连线上的三个格子。
pub type Line = [CellIndex; 3];

pub const BOARD_SIZE: usize = 9;

/// 三行、三列、两条对角线，顺序固定。
pub const WINNING_LINES: [Line; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

const DEFAULT_X_COLOR: &str = "#8ecae6";
const DEFAULT_O_COLOR: &str = "#f7cad0";

static DEFAULT_PALETTE: Lazy<Palette> = Lazy::new(|| Palette {
    x: DEFAULT_X_COLOR.to_string(),
    o: DEFAULT_O_COLOR.to_string(),
});

/// 棋子。X 永远先手。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Mark {
    #[default]
    X,
    O,
}

impl Mark {
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Mark {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("board needs {expected} cells, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unexpected character '{character}' at cell {position}")]
    InvalidCellCharacter { character: char, position: usize },
    #[error("invalid piece counts: X={x_count}, O={o_count}")]
    PieceCountMismatch { x_count: usize, o_count: usize },
    #[error("both marks hold a winning line")]
    BothMarksAligned,
    #[error("turn marker is {actual} but the piece counts say {expected}")]
    TurnMismatch { expected: Mark, actual: Mark },
}

/// 3×3 棋盘。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Board {
    cells: [Option<Mark>; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Mark>; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<Mark>; BOARD_SIZE] {
        &self.cells
    }

    /// 越界下标视为空。
    pub fn get(&self, index: CellIndex) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    pub fn in_bounds(index: CellIndex) -> bool {
        index < BOARD_SIZE
    }

    pub fn is_vacant(&self, index: CellIndex) -> bool {
        Self::in_bounds(index) && self.cells[index].is_none()
    }

    /// 调用方负责检查下标与占用情况。
    pub(crate) fn place(&mut self, index: CellIndex, mark: Mark) {
        self.cells[index] = Some(mark);
    }

    /// 返回落子后的新棋盘，原棋盘不变。
    pub fn with_move(&self, index: CellIndex, mark: Mark) -> Board {
        let mut next = *self;
        next.place(index, mark);
        next
    }

    pub fn available_moves(&self) -> Vec<CellIndex> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn count(&self, mark: Mark) -> usize {
        self.cells.iter().filter(|cell| **cell == Some(mark)).count()
    }

    /// 按先手交替推算下一手。
    pub fn mark_to_move(&self) -> Mark {
        if self.count(Mark::X) > self.count(Mark::O) {
            Mark::O
        } else {
            Mark::X
        }
    }

    pub fn winning_lines_for(&self, mark: Mark) -> Vec<Line> {
        WINNING_LINES
            .iter()
            .filter(|line| line.iter().all(|&index| self.cells[index] == Some(mark)))
            .copied()
            .collect()
    }

    /// 第一条连成的线决定胜者，并返回该胜者的全部连线。
    pub fn evaluate(&self) -> Outcome {
        let first_aligned = WINNING_LINES.iter().find_map(|&[a, b, c]| {
            let mark = self.cells[a]?;
            (self.cells[b] == Some(mark) && self.cells[c] == Some(mark)).then_some(mark)
        });

        if let Some(winner) = first_aligned {
            return Outcome::Won {
                winner,
                lines: self.winning_lines_for(winner),
            };
        }

        if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let x_count = self.count(Mark::X);
        let o_count = self.count(Mark::O);
        if x_count < o_count || x_count - o_count > 1 {
            return Err(IntegrityError::PieceCountMismatch { x_count, o_count });
        }
        if !self.winning_lines_for(Mark::X).is_empty() && !self.winning_lines_for(Mark::O).is_empty() {
            return Err(IntegrityError::BothMarksAligned);
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = IntegrityError;

    /// `X`/`O` 为棋子，`.`、`-`、`_` 为空格，`/` 与空白被忽略。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cells = [None; BOARD_SIZE];
        let mut position = 0;
        for character in s.chars() {
            if character == '/' || character.is_whitespace() {
                continue;
            }
            let cell = match character {
                'X' | 'x' => Some(Mark::X),
                'O' | 'o' => Some(Mark::O),
                '.' | '-' | '_' => None,
                other => {
                    return Err(IntegrityError::InvalidCellCharacter {
                        character: other,
                        position,
                    })
                }
            };
            if position < BOARD_SIZE {
                cells[position] = cell;
            }
            position += 1;
        }

        if position != BOARD_SIZE {
            return Err(IntegrityError::InvalidLength {
                expected: BOARD_SIZE,
                actual: position,
            });
        }
        Ok(Board { cells })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, cell) in self.cells.iter().enumerate() {
            if index > 0 && index % 3 == 0 {
                write!(f, "/")?;
            }
            match cell {
                Some(mark) => write!(f, "{mark}")?,
                None => write!(f, ".")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outcome {
    Ongoing,
    Won { winner: Mark, lines: Vec<Line> },
    Draw,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }

    pub fn winner(&self) -> Option<Mark> {
        match self {
            Outcome::Won { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Outcome::Ongoing
    }
}

/// 比分：跨局累计，回到首页时清零。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreTally {
    pub x: u32,
    pub o: u32,
    pub draws: u32,
}

impl ScoreTally {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Won { winner: Mark::X, .. } => self.x += 1,
            Outcome::Won { winner: Mark::O, .. } => self.o += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Ongoing => {}
        }
    }

    pub fn wins(&self, mark: Mark) -> u32 {
        match mark {
            Mark::X => self.x,
            Mark::O => self.o,
        }
    }

    pub fn reset(&mut self) {
        *self = ScoreTally::default();
    }
}

/// 每种棋子的显示颜色（`#rrggbb`）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Palette {
    #[serde(default = "default_x_color", alias = "X")]
    pub x: String,
    #[serde(default = "default_o_color", alias = "O")]
    pub o: String,
}

fn default_x_color() -> String {
    DEFAULT_PALETTE.x.clone()
}

fn default_o_color() -> String {
    DEFAULT_PALETTE.o.clone()
}

impl Palette {
    pub fn color_for(&self, mark: Mark) -> &str {
        match mark {
            Mark::X => &self.x,
            Mark::O => &self.o,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        DEFAULT_PALETTE.clone()
    }
}

/// 对局事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    MovePlayed { mark: Mark, index: CellIndex },
    TurnPassed { next: Mark },
    GameWon { winner: Mark, lines: Vec<Line> },
    GameDrawn,
    MatchReset,
}

/// 单局状态：棋盘、轮到谁、结果与事件记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub board: Board,
    pub current: Mark,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            current: Mark::X,
            outcome: Outcome::Ongoing,
            event_log: Vec::new(),
        }
    }

    /// 从任意合法棋盘恢复，轮次按棋子数推算。
    pub fn from_board(board: Board) -> Self {
        Self {
            board,
            current: board.mark_to_move(),
            outcome: board.evaluate(),
            event_log: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        self.board.integrity_check()?;
        if !self.is_finished() {
            let expected = self.board.mark_to_move();
            if expected != self.current {
                return Err(IntegrityError::TurnMismatch {
                    expected,
                    actual: self.current,
                });
            }
        }
        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
