use super::{
    errors::StateError,
    model::{Experiment, FieldKey, MISSING_VALUE, RunId},
    result::StateResult,
};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde_json::Value;
use std::cmp::Ordering;

const PARALLEL_SORT_THRESHOLD: usize = 10_000;

pub type F64 = OrderedFloat<f64>;

// SortValue - значение поля, пригодное для сравнения между типами.
// Порядок вариантов задает порядок типов: null < строки < числа < остальное.

#[derive(Debug,Clone,PartialEq,Eq,PartialOrd,Ord)]
pub enum SortValue {
    Null,
    Text(String),
    Number(F64),
    // arrays and objects, compared by their json text
    Other(String),
}

impl SortValue {
    // a missing field is shown and sorted as the `---` placeholder
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => Self::Text(MISSING_VALUE.to_string()),
            Some(Value::Null) => Self::Null,
            Some(Value::String(text)) => Self::Text(text.clone()),
            Some(Value::Bool(flag)) => Self::Number(OrderedFloat(f64::from(u8::from(*flag)))),
            Some(Value::Number(number)) => number
                .as_f64()
                .map(|n| Self::Number(OrderedFloat(n)))
                .unwrap_or_else(|| Self::Other(number.to_string())),
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    SortValue::of(left).cmp(&SortValue::of(right))
}

/// Sorts runs lexicographically by the fields of `order`; runs which compare
/// equal on all fields keep a stable order by id.
pub fn sort_experiments<'a, I>(experiments: I, order: &[FieldKey]) -> Vec<RunId>
where
    I: IntoIterator<Item = &'a Experiment>,
{
    let mut rows: Vec<(Vec<SortValue>, RunId)> = experiments
        .into_iter()
        .map(|experiment| {
            let values = order
                .iter()
                .map(|field| SortValue::of(experiment.field(field)))
                .collect();
            (values, experiment.id().clone())
        })
        .collect();

    if rows.len() < PARALLEL_SORT_THRESHOLD {
        rows.sort_unstable();
    } else {
        rows.par_sort_unstable();
    }

    rows.into_iter().map(|(_, id)| id).collect()
}

// SortOrder
//
// Порядок сортировки - подмножество доступных (видимых) полей.

#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct SortOrder {
    order: Vec<FieldKey>,
    available: Vec<FieldKey>,
}

impl SortOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> &[FieldKey] {
        &self.order
    }

    pub fn available_fields(&self) -> &[FieldKey] {
        &self.available
    }

    // Keeps as much of the current order as is still available
    pub fn set_available_fields(&mut self, fields: Vec<FieldKey>) {
        self.available = fields;
        let available = &self.available;
        self.order.retain(|field| available.contains(field));
    }

    /// Puts `field` at `position` of the order. A field already in the order
    /// is moved; positions past the end append.
    pub fn sort_request(&mut self, field: FieldKey, position: usize) -> StateResult<()> {
        if !self.available.contains(&field) {
            return Err(StateError::FieldNotAvailable {
                field: field.to_string(),
            });
        }
        if let Some(old) = self.order.iter().position(|current| *current == field) {
            self.order.remove(old);
        }
        let position = position.min(self.order.len());
        self.order.insert(position, field);
        Ok(())
    }

    // Restores a saved order, unknown and repeated fields are dropped
    pub fn replace_order(&mut self, order: Vec<FieldKey>) {
        let mut restored: Vec<FieldKey> = Vec::with_capacity(order.len());
        for field in order {
            if self.available.contains(&field) && !restored.contains(&field) {
                restored.push(field);
            }
        }
        self.order = restored;
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.available.clear();
    }
}
