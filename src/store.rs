use super::{
    errors::StoreError,
    model::RunId,
    result::StoreResult,
};
use ahash::AHashSet;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fs,
    path::Path,
    sync::Arc,
};
use tracing::{debug, info};

// RunStore
//
// Доступ к документному хранилищу (в оригинале - MongoDB). Соединение
// передается явно через StoreHandle, глобального клиента нет.

pub trait RunStore: Send + Sync {
    fn database_names(&self) -> StoreResult<Vec<String>>;

    fn collection_names(&self, database: &str) -> StoreResult<Vec<String>>;

    // ids of all documents matching `filter`, in natural order
    fn find_ids(&self, database: &str, collection: &str, filter: &Value) -> StoreResult<Vec<RunId>>;

    /// Fetches one document. `projection` limits the returned top-level
    /// fields, `_id` is always included.
    fn find_one(
        &self,
        database: &str,
        collection: &str,
        id: &RunId,
        projection: Option<&[&str]>,
    ) -> StoreResult<Value>;

    fn delete_many(&self, database: &str, collection: &str, ids: &[RunId]) -> StoreResult<usize>;

    // false if there was nothing to drop
    fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<bool>;
}

pub type StoreHandle = Arc<dyn RunStore>;

// MemoryStore

type Collection = Vec<Value>;
type Collections = BTreeMap<String, Collection>;

#[derive(Debug,Default)]
pub struct MemoryStore {
    databases: RwLock<BTreeMap<String, Collections>>,
}

impl MemoryStore {
    // Constructors

    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a dump of the form
    /// `{"<database>": {"<collection>": [documents...]}}`.
    pub fn from_json(dump: &Value) -> StoreResult<Self> {
        let store = Self::new();
        let databases = dump.as_object().ok_or_else(|| StoreError::Dump {
            reason: "top level must be an object of databases".to_string(),
        })?;
        for (database, collections) in databases {
            let collections = collections.as_object().ok_or_else(|| StoreError::Dump {
                reason: format!("database {database} must be an object of collections"),
            })?;
            for (collection, documents) in collections {
                let documents = documents.as_array().ok_or_else(|| StoreError::Dump {
                    reason: format!("collection {database}.{collection} must be an array"),
                })?;
                store.create_collection(database, collection);
                for document in documents {
                    store.insert(database, collection, document.clone());
                }
            }
        }
        Ok(store)
    }

    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        let dump: Value = serde_json::from_str(text).map_err(|err| StoreError::Dump {
            reason: err.to_string(),
        })?;
        Self::from_json(&dump)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| StoreError::Dump {
            reason: format!("{}: {err}", path.display()),
        })?;
        let store = Self::from_json_str(&text)?;
        info!(path = %path.display(), "loaded store dump");
        Ok(store)
    }

    pub fn into_handle(self) -> StoreHandle {
        Arc::new(self)
    }

    // Mutation

    pub fn create_collection(&self, database: &str, collection: &str) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
    }

    pub fn insert(&self, database: &str, collection: &str, document: Value) {
        self.databases
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    pub fn document_count(&self, database: &str, collection: &str) -> StoreResult<usize> {
        let databases = self.databases.read();
        Ok(collection_of(&databases, database, collection)?.len())
    }

    pub fn to_json(&self) -> Value {
        let databases = self.databases.read();
        let dump: Map<String, Value> = databases
            .iter()
            .map(|(database, collections)| {
                let collections: Map<String, Value> = collections
                    .iter()
                    .map(|(name, documents)| (name.clone(), Value::Array(documents.clone())))
                    .collect();
                (database.clone(), Value::Object(collections))
            })
            .collect();
        Value::Object(dump)
    }

    pub fn write_dump<P: AsRef<Path>>(&self, path: P) -> StoreResult<()> {
        let text = serde_json::to_string_pretty(&self.to_json()).map_err(|err| StoreError::Dump {
            reason: err.to_string(),
        })?;
        fs::write(path.as_ref(), text).map_err(|err| StoreError::Dump {
            reason: format!("{}: {err}", path.as_ref().display()),
        })
    }
}

fn collection_of<'a>(
    databases: &'a BTreeMap<String, Collections>,
    database: &str,
    collection: &str,
) -> StoreResult<&'a Collection> {
    databases
        .get(database)
        .ok_or_else(|| StoreError::DatabaseNotFound { name: database.to_string() })?
        .get(collection)
        .ok_or_else(|| StoreError::CollectionNotFound {
            database: database.to_string(),
            name: collection.to_string(),
        })
}

fn document_id(document: &Value) -> Option<RunId> {
    document.get("_id").and_then(RunId::from_value)
}

impl RunStore for MemoryStore {
    fn database_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.databases.read().keys().cloned().collect())
    }

    fn collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        self.databases
            .read()
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .ok_or_else(|| StoreError::DatabaseNotFound { name: database.to_string() })
    }

    fn find_ids(&self, database: &str, collection: &str, filter: &Value) -> StoreResult<Vec<RunId>> {
        let predicate = Predicate::compile(filter)?;
        let databases = self.databases.read();
        let documents = collection_of(&databases, database, collection)?;
        let ids: Vec<RunId> = documents
            .iter()
            .filter(|document| predicate.matches(document))
            .filter_map(document_id)
            .collect();
        debug!(database, collection, scanned = documents.len(), matched = ids.len(), "find_ids");
        Ok(ids)
    }

    fn find_one(
        &self,
        database: &str,
        collection: &str,
        id: &RunId,
        projection: Option<&[&str]>,
    ) -> StoreResult<Value> {
        let databases = self.databases.read();
        let document = collection_of(&databases, database, collection)?
            .iter()
            .find(|document| document_id(document).as_ref() == Some(id))
            .ok_or_else(|| StoreError::DocumentNotFound { id: id.to_string() })?;

        let Some(fields) = projection else {
            return Ok(document.clone());
        };
        let projected: Map<String, Value> = document
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| key.as_str() == "_id" || fields.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Object(projected))
    }

    fn delete_many(&self, database: &str, collection: &str, ids: &[RunId]) -> StoreResult<usize> {
        let doomed: AHashSet<&RunId> = ids.iter().collect();
        let mut databases = self.databases.write();
        let documents = databases
            .get_mut(database)
            .ok_or_else(|| StoreError::DatabaseNotFound { name: database.to_string() })?
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound {
                database: database.to_string(),
                name: collection.to_string(),
            })?;
        let before = documents.len();
        documents.retain(|document| {
            document_id(document).is_none_or(|id| !doomed.contains(&id))
        });
        let deleted = before - documents.len();
        info!(database, collection, deleted, "deleted documents");
        Ok(deleted)
    }

    fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let dropped = databases
            .get_mut(database)
            .is_some_and(|collections| collections.remove(collection).is_some());
        if dropped {
            info!(database, collection, "dropped collection");
        }
        Ok(dropped)
    }
}

// Query evaluation
//
// Поддерживается подмножество языка запросов MongoDB, достаточное для
// фильтров браузера. Запрос компилируется один раз, регулярные выражения
// тоже.

#[derive(Debug)]
enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Field {
        path: String,
        tests: Vec<Test>,
    },
}

#[derive(Debug)]
enum Test {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Compare(Ordering, bool, Value),
    Regex(Regex),
}

impl Predicate {
    fn compile(filter: &Value) -> StoreResult<Self> {
        let map = match filter {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::And(Vec::new())),
            _ => return Err(StoreError::UnsupportedOperator {
                operator: "non-object filter".to_string(),
            }),
        };

        let mut parts = Vec::with_capacity(map.len());
        for (key, condition) in map {
            let part = match key.as_str() {
                "$and" => Self::And(compile_list(key, condition)?),
                "$or" => Self::Or(compile_list(key, condition)?),
                "$nor" => Self::Nor(compile_list(key, condition)?),
                operator if operator.starts_with('$') => {
                    return Err(StoreError::UnsupportedOperator {
                        operator: operator.to_string(),
                    });
                }
                path => Self::Field {
                    path: path.to_string(),
                    tests: compile_tests(condition)?,
                },
            };
            parts.push(part);
        }
        Ok(Self::And(parts))
    }

    fn matches(&self, document: &Value) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|part| part.matches(document)),
            Self::Or(parts) => parts.iter().any(|part| part.matches(document)),
            Self::Nor(parts) => !parts.iter().any(|part| part.matches(document)),
            Self::Field { path, tests } => {
                let value = lookup(document, path);
                tests.iter().all(|test| test.matches(value))
            }
        }
    }
}

fn compile_list(operator: &str, condition: &Value) -> StoreResult<Vec<Predicate>> {
    condition
        .as_array()
        .ok_or_else(|| StoreError::UnsupportedOperator {
            operator: format!("{operator} without array"),
        })?
        .iter()
        .map(Predicate::compile)
        .collect()
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|map| !map.is_empty() && map.keys().all(|key| key.starts_with('$')))
}

fn compile_tests(condition: &Value) -> StoreResult<Vec<Test>> {
    if !is_operator_object(condition) {
        return Ok(vec![Test::Eq(condition.clone())]);
    }
    let Some(operators) = condition.as_object() else {
        return Ok(Vec::new());
    };

    let mut tests = Vec::with_capacity(operators.len());
    for (operator, argument) in operators {
        let test = match operator.as_str() {
            "$eq" => Test::Eq(argument.clone()),
            "$ne" => Test::Ne(argument.clone()),
            "$in" => Test::In(array_argument(operator, argument)?),
            "$nin" => Test::Nin(array_argument(operator, argument)?),
            "$exists" => Test::Exists(truthy(argument)),
            "$gt" => Test::Compare(Ordering::Greater, false, argument.clone()),
            "$gte" => Test::Compare(Ordering::Greater, true, argument.clone()),
            "$lt" => Test::Compare(Ordering::Less, false, argument.clone()),
            "$lte" => Test::Compare(Ordering::Less, true, argument.clone()),
            "$regex" => {
                let options = operators.get("$options").and_then(Value::as_str).unwrap_or("");
                Test::Regex(compile_regex(argument, options)?)
            }
            // consumed together with $regex
            "$options" => continue,
            other => {
                return Err(StoreError::UnsupportedOperator {
                    operator: other.to_string(),
                });
            }
        };
        tests.push(test);
    }
    Ok(tests)
}

fn array_argument(operator: &str, argument: &Value) -> StoreResult<Vec<Value>> {
    argument
        .as_array()
        .cloned()
        .ok_or_else(|| StoreError::UnsupportedOperator {
            operator: format!("{operator} without array"),
        })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

fn compile_regex(pattern: &Value, options: &str) -> StoreResult<Regex> {
    let pattern = pattern.as_str().ok_or_else(|| StoreError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: "pattern must be a string".to_string(),
    })?;
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|err| StoreError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

// Dotted path lookup, `config.optimizer.lr`
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

impl Test {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => equals_or_contains(value, expected),
            Self::Ne(expected) => !equals_or_contains(value, expected),
            Self::In(candidates) => candidates.iter().any(|expected| equals_or_contains(value, expected)),
            Self::Nin(candidates) => !candidates.iter().any(|expected| equals_or_contains(value, expected)),
            Self::Exists(expected) => value.is_some() == *expected,
            Self::Compare(direction, inclusive, bound) => any_element(value, |item| {
                compare(item, bound).is_some_and(|ordering| {
                    ordering == *direction || (*inclusive && ordering == Ordering::Equal)
                })
            }),
            Self::Regex(regex) => any_element(value, |item| {
                item.as_str().is_some_and(|text| regex.is_match(text))
            }),
        }
    }
}

// Arrays match when the array itself or one of its elements matches
fn any_element<F>(value: Option<&Value>, test: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    match value {
        None => false,
        Some(Value::Array(items)) => items.iter().any(&test),
        Some(item) => test(item),
    }
}

fn equals_or_contains(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        // null also matches missing fields
        None => expected.is_null(),
        Some(value) if values_equal(value, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
        Some(_) => false,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

// Only values of the same type family are ordered
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
