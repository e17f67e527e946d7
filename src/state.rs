use super::{
    diff::{Change, TieBreak, coalesce, edit_script_by},
    errors::StateError,
    model::{Experiment, FieldKey, MISSING_VALUE},
    query::parse_query,
    result::{QueryResult, StateResult},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display};
use tracing::{debug, warn};

// Fields
//
// Видимые поля - колонки списка экспериментов, невидимые хранятся
// отсортированными. Каждая операция возвращает правки обоих списков,
// чтобы представление могло обновиться без полного сброса.

#[derive(Debug,Clone,Default,PartialEq)]
pub struct FieldChanges {
    pub visible: Vec<Change<FieldKey>>,
    pub invisible: Vec<Change<FieldKey>>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.invisible.is_empty()
    }
}

#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct Fields {
    visible: Vec<FieldKey>,
    invisible: Vec<FieldKey>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> &[FieldKey] {
        &self.visible
    }

    pub fn invisible(&self) -> &[FieldKey] {
        &self.invisible
    }

    pub fn available(&self) -> Vec<FieldKey> {
        self.invisible.iter().chain(self.visible.iter()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.visible.len() + self.invisible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_fields(&mut self, mut invisible: Vec<FieldKey>, visible: Vec<FieldKey>) -> FieldChanges {
        invisible.sort();
        let changes = FieldChanges {
            visible: script(&self.visible, &visible),
            invisible: script(&self.invisible, &invisible),
        };
        self.visible = visible;
        self.invisible = invisible;
        changes
    }

    /// Restores a saved layout against the fields the study currently has.
    /// Saved fields which no longer exist are dropped, new fields become
    /// visible. Without a saved layout every field is visible.
    pub fn load(
        &mut self,
        available: &[FieldKey],
        saved_visible: Option<&[FieldKey]>,
        saved_invisible: Option<&[FieldKey]>,
    ) -> FieldChanges {
        let (Some(saved_visible), Some(saved_invisible)) = (saved_visible, saved_invisible) else {
            return self.set_fields(Vec::new(), available.to_vec());
        };

        let mut visible: Vec<FieldKey> = saved_visible
            .iter()
            .filter(|field| available.contains(field))
            .cloned()
            .collect();
        let invisible: Vec<FieldKey> = saved_invisible
            .iter()
            .filter(|field| available.contains(field) && !visible.contains(field))
            .cloned()
            .collect();
        for field in available {
            if !visible.contains(field) && !invisible.contains(field) {
                visible.push(field.clone());
            }
        }
        self.set_fields(invisible, visible)
    }

    // Swaps the visible field at `row` with its upper neighbour
    pub fn move_up(&mut self, row: usize) -> FieldChanges {
        if row < 1 || row >= self.visible.len() {
            return FieldChanges::default();
        }
        let moved = self.visible.remove(row - 1);
        self.visible.insert(row, moved.clone());
        FieldChanges {
            visible: vec![
                Change::Remove { position: row - 1, count: 1 },
                Change::Insert { position: row, elements: vec![moved] },
            ],
            invisible: Vec::new(),
        }
    }

    pub fn move_down(&mut self, row: usize) -> FieldChanges {
        if row >= self.visible.len().saturating_sub(1) {
            return FieldChanges::default();
        }
        let moved = self.visible.remove(row + 1);
        self.visible.insert(row, moved.clone());
        FieldChanges {
            visible: vec![
                Change::Remove { position: row + 1, count: 1 },
                Change::Insert { position: row, elements: vec![moved] },
            ],
            invisible: Vec::new(),
        }
    }

    // Moves invisible field `row` to the visible list, at `at` or at the end
    pub fn add_visible(&mut self, row: usize, at: Option<usize>) -> StateResult<FieldChanges> {
        if row >= self.invisible.len() {
            return Err(StateError::RowOutOfRange {
                row,
                len: self.invisible.len(),
            });
        }
        let field = self.invisible.remove(row);
        let position = at.unwrap_or(self.visible.len()).min(self.visible.len());
        self.visible.insert(position, field.clone());
        Ok(FieldChanges {
            visible: vec![Change::Insert { position, elements: vec![field] }],
            invisible: vec![Change::Remove { position: row, count: 1 }],
        })
    }

    pub fn remove_visible(&mut self, row: usize) -> StateResult<FieldChanges> {
        if row >= self.visible.len() {
            return Err(StateError::RowOutOfRange {
                row,
                len: self.visible.len(),
            });
        }
        let field = self.visible.remove(row);
        let position = self.invisible.partition_point(|current| *current <= field);
        self.invisible.insert(position, field.clone());
        Ok(FieldChanges {
            visible: vec![Change::Remove { position: row, count: 1 }],
            invisible: vec![Change::Insert { position, elements: vec![field] }],
        })
    }

    pub fn show(&mut self, field: &FieldKey) -> StateResult<FieldChanges> {
        match self.invisible.iter().position(|current| current == field) {
            Some(row) => self.add_visible(row, None),
            None => Err(StateError::FieldNotAvailable { field: field.to_string() }),
        }
    }

    pub fn hide(&mut self, field: &FieldKey) -> StateResult<FieldChanges> {
        match self.visible.iter().position(|current| current == field) {
            Some(row) => self.remove_visible(row),
            None => Err(StateError::FieldNotAvailable { field: field.to_string() }),
        }
    }

    pub fn visible_position(&self, field: &FieldKey) -> Option<usize> {
        self.visible.iter().position(|current| current == field)
    }
}

fn script(old: &[FieldKey], new: &[FieldKey]) -> Vec<Change<FieldKey>> {
    coalesce(edit_script_by(old, new, TieBreak::StructuralFirst, |a, b| a == b))
}

// DbFilter - последний принятый фильтр

#[derive(Debug,Clone,PartialEq)]
pub struct DbFilter {
    text: String,
    query: Value,
}

impl Default for DbFilter {
    fn default() -> Self {
        Self {
            text: String::new(),
            query: Value::Object(Map::new()),
        }
    }
}

impl DbFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `text`; a rejected filter leaves the previous one in place.
    pub fn try_set_filter_text(&mut self, text: &str) -> QueryResult<&Value> {
        match parse_query(text) {
            Ok(query) => {
                debug!(filter = text, "filter accepted");
                self.text = text.to_string();
                self.query = query;
                Ok(&self.query)
            }
            Err(err) => {
                warn!(filter = text, error = %err, "filter rejected");
                Err(err)
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn query(&self) -> &Value {
        &self.query
    }
}

// View mode of result values

#[derive(Debug,Clone,Copy,Default,PartialEq,Eq,Hash,Serialize,Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Raw,
    #[default]
    Rounded,
    Percent,
}

impl Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f,"raw"),
            Self::Rounded => write!(f,"rounded"),
            Self::Percent => write!(f,"percent"),
        }
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "rounded" => Ok(Self::Rounded),
            "percent" => Ok(Self::Percent),
            other => Err(format!("unknown view mode '{other}'")),
        }
    }
}

/// Renders a cell. Numbers follow `mode`, everything else is shown as is,
/// a missing value is `---`.
pub fn format_value(value: Option<&Value>, mode: ViewMode) -> String {
    let Some(value) = value else {
        return MISSING_VALUE.to_string();
    };
    match value {
        Value::Null => "None".to_string(),
        Value::String(text) => text.clone(),
        Value::Number(number) => match (mode, number.as_f64()) {
            (ViewMode::Rounded, Some(n)) => format!("{n:.2}"),
            (ViewMode::Percent, Some(n)) => format!("{:.2}%", n * 100.0),
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}

// Row markers

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub enum RowMarker {
    Normal,
    Duplicate,
    Failed,
    Interrupted,
    Running,
}

impl RowMarker {
    // a possible duplicate is the most important hint
    pub fn of(experiment: &Experiment, duplicate: bool) -> Self {
        if duplicate {
            return Self::Duplicate;
        }
        match experiment.status() {
            "FAILED" => Self::Failed,
            "INTERRUPTED" => Self::Interrupted,
            "RUNNING" => Self::Running,
            _ => Self::Normal,
        }
    }
}
