#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    #[error("Register pool exhausted while lowering {0}")]
    RegisterPoolExhausted(String),

    #[error("Variable `{0}` has no stack slot")]
    UnknownVariable(String),

    #[error("Function `{0}` not found")]
    UnknownFunction(String),

    #[error("Named type `{0}` not found")]
    UnknownType(String),

    #[error("Record {record} has no field `{field}`")]
    UnknownField { record: String, field: String },

    #[error("Named type `{0}` refers to itself")]
    CyclicType(String),

    #[error("Entry function `{0}` not found")]
    NoEntryPoint(String),

    #[error("Entry function `{0}` must not take parameters")]
    InvalidEntryPoint(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
