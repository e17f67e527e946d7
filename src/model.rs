use super::{
    errors::ModelError,
    result::ModelResult,
};
use ahash::AHashSet;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    convert::Infallible,
    fmt::{self, Display},
    str::FromStr,
};
use tracing::warn;

pub const UNKNOWN_STATUS: &str = "UNKNOWN";
pub const MISSING_VALUE: &str = "---";
// ignored when looking for duplicate runs
const SEED_KEY: &str = "seed";

// RunId - значение поля `_id` документа

#[derive(Debug,Clone,PartialEq,Eq,Hash,PartialOrd,Ord,Serialize,Deserialize)]
#[serde(untagged)]
pub enum RunId {
    Int(i64),
    Text(String),
}

impl RunId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Int),
            Value::String(text) => Some(Self::Text(text.clone())),
            // extended json ObjectId
            Value::Object(map) => map
                .get("$oid")
                .and_then(Value::as_str)
                .map(|oid| Self::Text(oid.to_string())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Text(id) => Value::String(id.clone()),
        }
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f,"{id}"),
            Self::Text(id) => write!(f,"{id}"),
        }
    }
}

impl FromStr for RunId {
    type Err = Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(match text.parse::<i64>() {
            Ok(id) => Self::Int(id),
            Err(_) => Self::Text(text.to_string()),
        })
    }
}

// Fields

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,PartialOrd,Ord,Serialize,Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Config,
    Result,
}

// stored as `config.<name>` / `result.<name>` text
#[derive(Debug,Clone,PartialEq,Eq,Hash,PartialOrd,Ord,Serialize,Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FieldKey {
    pub kind: FieldKind,
    pub name: String,
}

impl FieldKey {
    pub fn config(name: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Config,
            name: name.into(),
        }
    }

    pub fn result(name: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Result,
            name: name.into(),
        }
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FieldKind::Config => write!(f,"config.{}", self.name),
            FieldKind::Result => write!(f,"result.{}", self.name),
        }
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for FieldKey {
    type Error = ModelError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl FromStr for FieldKey {
    type Err = ModelError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if let Some(name) = text.strip_prefix("config.") {
            Ok(Self::config(name))
        } else if let Some(name) = text.strip_prefix("result.") {
            Ok(Self::result(name))
        } else {
            Err(ModelError::UnknownField { field: text.to_string() })
        }
    }
}

// Document parsing

// Вложенные словари конфигурации превращаются в плоские ключи `a.b.c`
pub fn flatten_config(config: &Value) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    match config {
        Value::Object(map) => flatten_into("", map, &mut flat),
        Value::Null => {}
        other => warn!(kind = value_kind(other), "config is not a dictionary, ignored"),
    }
    flat
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, flat: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(&path, inner, flat),
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

/// Turns the `result` entry of a run into named columns.
///
/// Lists (also jsonpickle tuples `{"py/tuple": [...]}`) become `Result 0`,
/// `Result 1`, ... with zero padded numbers once there are ten or more
/// entries, dictionaries become `Result <key>`, a single value is `Result 0`.
pub fn parse_result(result: &Value) -> BTreeMap<String, Value> {
    match result {
        Value::Array(items) => result_list(items),
        Value::Object(map) => match map.get("py/tuple") {
            Some(Value::Array(items)) => result_list(items),
            _ => map
                .iter()
                .map(|(key, value)| (format!("Result {key}"), value.clone()))
                .collect(),
        },
        Value::Null => BTreeMap::new(),
        scalar => BTreeMap::from([("Result 0".to_string(), scalar.clone())]),
    }
}

fn result_list(items: &[Value]) -> BTreeMap<String, Value> {
    let padded = items.len() >= 10;
    items
        .iter()
        .enumerate()
        .map(|(pos, value)| {
            let name = if padded {
                format!("Result {pos:02}")
            } else {
                format!("Result {pos}")
            };
            (name, value.clone())
        })
        .collect()
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(f64::from(u8::from(*flag))),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Experiment

#[derive(Debug,Clone,PartialEq)]
pub struct Experiment {
    id: RunId,
    status: String,
    config: BTreeMap<String, Value>,
    result: BTreeMap<String, Value>,
    // full document, only after an explicit load
    details: Option<Value>,
}

impl Experiment {
    // fields needed for the overview
    pub const PROJECTION: [&'static str; 4] = ["_id", "config", "result", "status"];

    pub fn from_document(document: &Value) -> ModelResult<Self> {
        let id = document
            .get("_id")
            .and_then(RunId::from_value)
            .ok_or(ModelError::MissingId)?;
        Ok(Self {
            id,
            status: status_of(document),
            config: document.get("config").map(flatten_config).unwrap_or_default(),
            result: document.get("result").map(parse_result).unwrap_or_default(),
            details: None,
        })
    }

    // Replace the overview data with a full document of the same run
    pub fn reload(&mut self, document: Value) {
        self.status = status_of(&document);
        self.config = document.get("config").map(flatten_config).unwrap_or_default();
        self.result = document.get("result").map(parse_result).unwrap_or_default();
        self.details = Some(document);
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    pub fn result(&self) -> &BTreeMap<String, Value> {
        &self.result
    }

    pub fn has_result(&self) -> bool {
        !self.result.is_empty()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.details.is_some()
    }

    pub fn config_fields(&self) -> impl Iterator<Item = &str> {
        self.config.keys().map(String::as_str)
    }

    pub fn result_fields(&self) -> impl Iterator<Item = &str> {
        self.result.keys().map(String::as_str)
    }

    pub fn field(&self, key: &FieldKey) -> Option<&Value> {
        match key.kind {
            FieldKind::Config => self.config.get(&key.name),
            FieldKind::Result => self.result.get(&key.name),
        }
    }

    // Configuration without the seed, serialized; equal keys mean duplicate runs
    pub fn duplicate_key(&self) -> String {
        let relevant: BTreeMap<&String, &Value> = self.config
            .iter()
            .filter(|(key, _)| key.as_str() != SEED_KEY)
            .collect();
        serde_json::to_string(&relevant).unwrap_or_default()
    }
}

fn status_of(document: &Value) -> String {
    document
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_STATUS)
        .to_string()
}

// Duplicates: every run whose configuration was already seen earlier in the list
pub fn find_duplicates<'a, I>(experiments: I) -> AHashSet<RunId>
where
    I: IntoIterator<Item = &'a Experiment>,
{
    let mut seen = AHashSet::new();
    let mut duplicates = AHashSet::new();
    for experiment in experiments {
        if !seen.insert(experiment.duplicate_key()) {
            duplicates.insert(experiment.id().clone());
        }
    }
    duplicates
}

#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub duplicates: usize,
    pub without_result: usize,
}

impl LoadSummary {
    pub fn of<'a, I>(experiments: I) -> Self
    where
        I: IntoIterator<Item = &'a Experiment>,
    {
        let mut summary = Self::default();
        let mut seen = AHashSet::new();
        for experiment in experiments {
            summary.loaded += 1;
            if !seen.insert(experiment.duplicate_key()) {
                summary.duplicates += 1;
            }
            if !experiment.has_result() {
                summary.without_result += 1;
            }
        }
        summary
    }
}

impl Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loaded {} entries, found {} possible duplicates, {} without result",
            self.loaded, self.duplicates, self.without_result
        )
    }
}

// Average and maximum per result column

#[derive(Debug,Clone,PartialEq)]
pub struct ResultStats {
    pub fields: Vec<String>,
    pub averages: Vec<f64>,
    pub maxima: Vec<f64>,
    pub rows: usize,
}

impl ResultStats {
    /// Rows without a result are skipped; all other rows must have the same
    /// number of numeric result columns.
    pub fn over<'a, I>(experiments: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = &'a Experiment>,
    {
        let mut fields: Vec<String> = Vec::new();
        let mut sums: Vec<f64> = Vec::new();
        let mut maxima: Vec<OrderedFloat<f64>> = Vec::new();
        let mut rows = 0usize;

        for experiment in experiments {
            if !experiment.has_result() {
                continue;
            }
            let values = experiment.result()
                .iter()
                .map(|(name, value)| {
                    as_number(value).ok_or_else(|| ModelError::NonNumericResult {
                        field: name.clone(),
                    })
                })
                .collect::<ModelResult<Vec<f64>>>()?;

            if rows == 0 {
                fields = experiment.result().keys().cloned().collect();
                sums = vec![0.0; values.len()];
                maxima = vec![OrderedFloat(f64::NEG_INFINITY); values.len()];
            } else if values.len() != fields.len() {
                return Err(ModelError::InconsistentResults {
                    expected: fields.len(),
                    found: values.len(),
                });
            }

            for (column, value) in values.into_iter().enumerate() {
                sums[column] += value;
                maxima[column] = maxima[column].max(OrderedFloat(value));
            }
            rows += 1;
        }

        if rows == 0 {
            return Err(ModelError::NoResults);
        }

        let count = rows as f64;
        Ok(Self {
            fields,
            averages: sums.into_iter().map(|sum| sum / count).collect(),
            maxima: maxima.into_iter().map(|max| max.into_inner()).collect(),
            rows,
        })
    }
}
