use super::errors::{
    GlobalError,
    HolderError,
    ModelError,
    QueryError,
    SettingsError,
    StateError,
    StoreError,
};

pub type HolderResult<T> = Result<T,HolderError>;
pub type QueryResult<T> = Result<T,QueryError>;
pub type StoreResult<T> = Result<T,StoreError>;
pub type ModelResult<T> = Result<T,ModelError>;
pub type StateResult<T> = Result<T,StateError>;
pub type SettingsResult<T> = Result<T,SettingsError>;
pub type GlobalResult<T> = Result<T,GlobalError>;
