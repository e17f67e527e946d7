use std::fmt::Display;

#[derive(Debug,Clone,PartialEq)]
pub enum HolderError {
    KeyNotFound{
        key: String,
    },
    PositionOutOfRange{
        position: usize,
        len: usize,
    },
    DuplicateKey{
        key: String,
    },
    Load{
        key: String,
        reason: String,
    },
    Listener{
        reason: String,
    },
}

impl Display for HolderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyNotFound { key } => write!(f,"key {key} not found"),
            Self::PositionOutOfRange { position, len } => write!(
                f,"position {position} out of range, holder contains {len} entries"
            ),
            Self::DuplicateKey { key } => write!(f,"key {key} appears more than once in the new key list"),
            Self::Load { key, reason } => write!(f,"can not load entry {key}, reason: {reason}"),
            Self::Listener { reason } => write!(f,"change listener failed: {reason}"),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum QueryError {
    MissingColon{
        line: usize,
    },
    DuplicateField{
        field: String,
        line: usize,
    },
    MalformedAlternatives{
        line: usize,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColon { line } => write!(f,"line {line} must contain at least one colon (:)"),
            Self::DuplicateField { field, line } => write!(f,"key {field} specified twice in line {line}"),
            Self::MalformedAlternatives { line } => write!(
                f,"illegal 'or' condition (required format [ ... ]) in line {line}"
            ),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum StoreError {
    DatabaseNotFound{
        name: String,
    },
    CollectionNotFound{
        database: String,
        name: String,
    },
    DocumentNotFound{
        id: String,
    },
    InvalidRegex{
        pattern: String,
        reason: String,
    },
    UnsupportedOperator{
        operator: String,
    },
    Dump{
        reason: String,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseNotFound { name } => write!(f,"database {name} not found"),
            Self::CollectionNotFound { database, name } => write!(f,"collection {name} not found in database {database}"),
            Self::DocumentNotFound { id } => write!(f,"document with _id {id} not found"),
            Self::InvalidRegex { pattern, reason } => write!(f,"invalid regex '{pattern}': {reason}"),
            Self::UnsupportedOperator { operator } => write!(f,"query operator {operator} is not supported"),
            Self::Dump { reason } => write!(f,"can not read dump: {reason}"),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum ModelError {
    MissingId,
    UnknownField{
        field: String,
    },
    NoResults,
    InconsistentResults{
        expected: usize,
        found: usize,
    },
    NonNumericResult{
        field: String,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f,"document has no usable _id"),
            Self::UnknownField { field } => write!(
                f,"field '{field}' must start with 'config.' or 'result.'"
            ),
            Self::NoResults => write!(f,"no rows with results selected"),
            Self::InconsistentResults { expected, found } => write!(
                f,"length of result lists are not consistent: expected {expected}, found {found}"
            ),
            Self::NonNumericResult { field } => write!(f,"result field '{field}' is not numeric"),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum StateError {
    FieldNotAvailable{
        field: String,
    },
    RowOutOfRange{
        row: usize,
        len: usize,
    },
    NoStudySelected,
}

impl Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldNotAvailable { field } => write!(f,"field {field} is not available for sorting"),
            Self::RowOutOfRange { row, len } => write!(f,"row {row} out of range, list contains {len} rows"),
            Self::NoStudySelected => write!(f,"no study selected"),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum SettingsError {
    Io{
        path: String,
        reason: String,
    },
    Parse{
        reason: String,
    },
    Serialize{
        reason: String,
    },
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f,"settings file {path}: {reason}"),
            Self::Parse { reason } => write!(f,"can not parse settings: {reason}"),
            Self::Serialize { reason } => write!(f,"can not serialize settings: {reason}"),
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub enum GlobalError {
    Holder(HolderError),
    Query(QueryError),
    Store(StoreError),
    Model(ModelError),
    State(StateError),
    Settings(SettingsError),
}

impl Display for GlobalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Holder(err) => write!(f,"{err}"),
            Self::Query(err) => write!(f,"{err}"),
            Self::Store(err) => write!(f,"{err}"),
            Self::Model(err) => write!(f,"{err}"),
            Self::State(err) => write!(f,"{err}"),
            Self::Settings(err) => write!(f,"{err}"),
        }
    }
}

impl std::error::Error for HolderError {}
impl std::error::Error for QueryError {}
impl std::error::Error for StoreError {}
impl std::error::Error for ModelError {}
impl std::error::Error for StateError {}
impl std::error::Error for SettingsError {}
impl std::error::Error for GlobalError {}

impl From<HolderError> for GlobalError {
    fn from(err: HolderError) -> Self {
        Self::Holder(err)
    }
}

impl From<QueryError> for GlobalError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}

impl From<StoreError> for GlobalError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ModelError> for GlobalError {
    fn from(err: ModelError) -> Self {
        Self::Model(err)
    }
}

impl From<StateError> for GlobalError {
    fn from(err: StateError) -> Self {
        Self::State(err)
    }
}

impl From<SettingsError> for GlobalError {
    fn from(err: SettingsError) -> Self {
        Self::Settings(err)
    }
}
