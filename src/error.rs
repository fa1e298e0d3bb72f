use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    Index,
    Relation,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Table => write!(f, "table"),
            ResourceType::Index => write!(f, "index"),
            ResourceType::Relation => write!(f, "relation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemrelErrorCode {
    Validation,
    TableAlreadyExists,
    IndexAlreadyExists,
    RelationAlreadyExists,
    TableNotFound,
    IndexNotFound,
    RelationNotFound,
    UnknownColumn,
    TypeMismatch,
    NotNullViolation,
    CheckConstraintFailed,
    UniqueViolation,
    ForeignKeyViolation,
    LockTimeout,
    Deadlock,
    Cancelled,
    UserError,
}

impl MemrelErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            MemrelErrorCode::Validation => "validation",
            MemrelErrorCode::TableAlreadyExists => "table_already_exists",
            MemrelErrorCode::IndexAlreadyExists => "index_already_exists",
            MemrelErrorCode::RelationAlreadyExists => "relation_already_exists",
            MemrelErrorCode::TableNotFound => "table_not_found",
            MemrelErrorCode::IndexNotFound => "index_not_found",
            MemrelErrorCode::RelationNotFound => "relation_not_found",
            MemrelErrorCode::UnknownColumn => "unknown_column",
            MemrelErrorCode::TypeMismatch => "type_mismatch",
            MemrelErrorCode::NotNullViolation => "not_null_violation",
            MemrelErrorCode::CheckConstraintFailed => "check_constraint_failed",
            MemrelErrorCode::UniqueViolation => "unique_violation",
            MemrelErrorCode::ForeignKeyViolation => "foreign_key_violation",
            MemrelErrorCode::LockTimeout => "lock_timeout",
            MemrelErrorCode::Deadlock => "deadlock",
            MemrelErrorCode::Cancelled => "cancelled",
            MemrelErrorCode::UserError => "user_error",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemrelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error(
        "type mismatch: column '{column}' in table '{table}' expected {expected}, got {actual}"
    )]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    #[error("NOT NULL violation: column '{column}' in table '{table}'")]
    NotNullViolation { table: String, column: String },
    #[error("check constraint '{constraint}' failed on table '{table}'")]
    CheckConstraintFailed { table: String, constraint: String },
    #[error("unique constraint violation on index '{index}' in table '{table}'")]
    UniqueViolation {
        table: String,
        index: String,
        key: String,
    },
    #[error("foreign key violation: {relation} references {ref_table}({ref_key})")]
    ForeignKeyViolation {
        relation: String,
        table: String,
        ref_table: String,
        ref_key: String,
    },
    #[error("lock timeout on table '{table}'")]
    LockTimeout { table: String },
    #[error("deadlock detected while locking table '{table}'")]
    Deadlock { table: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("user error: {0}")]
    User(String),
}

impl MemrelError {
    pub fn code(&self) -> MemrelErrorCode {
        match self {
            MemrelError::Validation(_) => MemrelErrorCode::Validation,
            MemrelError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Table => MemrelErrorCode::TableAlreadyExists,
                ResourceType::Index => MemrelErrorCode::IndexAlreadyExists,
                ResourceType::Relation => MemrelErrorCode::RelationAlreadyExists,
            },
            MemrelError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Table => MemrelErrorCode::TableNotFound,
                ResourceType::Index => MemrelErrorCode::IndexNotFound,
                ResourceType::Relation => MemrelErrorCode::RelationNotFound,
            },
            MemrelError::UnknownColumn { .. } => MemrelErrorCode::UnknownColumn,
            MemrelError::TypeMismatch { .. } => MemrelErrorCode::TypeMismatch,
            MemrelError::NotNullViolation { .. } => MemrelErrorCode::NotNullViolation,
            MemrelError::CheckConstraintFailed { .. } => MemrelErrorCode::CheckConstraintFailed,
            MemrelError::UniqueViolation { .. } => MemrelErrorCode::UniqueViolation,
            MemrelError::ForeignKeyViolation { .. } => MemrelErrorCode::ForeignKeyViolation,
            MemrelError::LockTimeout { .. } => MemrelErrorCode::LockTimeout,
            MemrelError::Deadlock { .. } => MemrelErrorCode::Deadlock,
            MemrelError::Cancelled => MemrelErrorCode::Cancelled,
            MemrelError::User(_) => MemrelErrorCode::UserError,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
