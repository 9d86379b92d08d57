use anyhow::Result;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Code,
    Markdown,
}

/// A single notebook cell backed by a rope, with linear undo history.
pub struct Cell {
    pub kind: CellKind,
    pub source: Rope,
    /// Cursor as a char index into the source.
    pub cursor: usize,
    pub outputs: Vec<String>,
    undo_stack: Vec<Rope>,
    redo_stack: Vec<Rope>,
}

impl Cell {
    pub fn new(kind: CellKind) -> Self {
        Self::from_source(kind, "")
    }

    pub fn from_source(kind: CellKind, source: &str) -> Self {
        let rope = Rope::from_str(source);
        let cursor = rope.len_chars();
        Self {
            kind,
            source: rope,
            cursor,
            outputs: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.source.to_string()
    }

    pub fn line_count(&self) -> usize {
        self.source.len_lines()
    }

    fn snapshot(&mut self) {
        // Rope clones are cheap (persistent structure).
        self.undo_stack.push(self.source.clone());
        self.redo_stack.clear();
    }

    pub fn insert_char(&mut self, ch: char) {
        self.snapshot();
        self.source.insert_char(self.cursor, ch);
        self.cursor += 1;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn delete_char_before(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.snapshot();
        self.source.remove(self.cursor - 1..self.cursor);
        self.cursor -= 1;
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo_stack.pop() else {
            return false;
        };
        self.redo_stack.push(self.source.clone());
        self.source = previous;
        self.cursor = self.cursor.min(self.source.len_chars());
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push(self.source.clone());
        self.source = next;
        self.cursor = self.cursor.min(self.source.len_chars());
        true
    }
}

#[derive(Serialize, Deserialize)]
struct CellRecord {
    kind: CellKind,
    source: String,
    #[serde(default)]
    outputs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct NotebookFile {
    cells: Vec<CellRecord>,
}

/// The open notebook: an ordered list of cells and an active selection.
pub struct Notebook {
    pub path: Option<PathBuf>,
    pub cells: Vec<Cell>,
    pub active: usize,
    pub dirty: bool,
    pub save_debounce: Option<Instant>,
}

impl Notebook {
    /// An unsaved notebook with one empty code cell.
    pub fn new() -> Self {
        Self {
            path: None,
            cells: vec![Cell::new(CellKind::Code)],
            active: 0,
            dirty: false,
            save_debounce: None,
        }
    }

    pub fn load(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)?;
        let file: NotebookFile = serde_json::from_str(&raw)?;
        let mut cells: Vec<Cell> = file
            .cells
            .into_iter()
            .map(|record| {
                let mut cell = Cell::from_source(record.kind, &record.source);
                cell.outputs = record.outputs;
                cell
            })
            .collect();
        if cells.is_empty() {
            cells.push(Cell::new(CellKind::Code));
        }
        Ok(Self {
            path: Some(path),
            cells,
            active: 0,
            dirty: false,
            save_debounce: None,
        })
    }

    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let file = NotebookFile {
            cells: self
                .cells
                .iter()
                .map(|cell| CellRecord {
                    kind: cell.kind,
                    source: cell.text(),
                    outputs: cell.outputs.clone(),
                })
                .collect(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        self.dirty = false;
        self.save_debounce = None;
        Ok(())
    }

    pub fn active_cell(&self) -> &Cell {
        &self.cells[self.active.min(self.cells.len() - 1)]
    }

    pub fn active_cell_mut(&mut self) -> &mut Cell {
        let index = self.active.min(self.cells.len() - 1);
        &mut self.cells[index]
    }

    pub fn select(&mut self, delta: i64) {
        let last = self.cells.len().saturating_sub(1) as i64;
        let next = (self.active as i64 + delta).clamp(0, last);
        self.active = next as usize;
    }

    pub fn insert_below(&mut self) {
        self.cells.insert(self.active + 1, Cell::new(CellKind::Code));
        self.active += 1;
        self.dirty = true;
    }

    /// Remove the active cell; the notebook always keeps at least one.
    pub fn delete_active(&mut self) {
        if self.cells.len() == 1 {
            self.cells[0] = Cell::new(CellKind::Code);
        } else {
            self.cells.remove(self.active);
            self.active = self.active.min(self.cells.len() - 1);
        }
        self.dirty = true;
    }
}
