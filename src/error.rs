//! Query error types
//!
//! Error codes fall into three categories:
//! - Planning (REJECT): raised while an interpreter is constructed, before any
//!   block is pulled. The query is rejected and never retried.
//! - Execution (ERROR): raised lazily when a pulled block triggers them. The
//!   stream is aborted.
//! - Resource (FATAL): the table structure lock could not be taken or a
//!   structural change collided with a running query.

use std::fmt;

/// Severity levels for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected during planning
    Reject,
    /// Query aborted during execution
    Error,
    /// Construction cannot proceed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Which phase of the query lifecycle produced the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Planning,
    Execution,
    Resource,
}

/// Query error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    // Planning
    /// JOIN in FROM is not supported at this layer
    UnsupportedJoin,
    /// Table not present in the catalog
    UnknownTable,
    /// Column or alias cannot be resolved
    UnknownIdentifier,
    /// Scalar or aggregate function name not recognised
    UnknownFunction,
    /// Argument type not accepted by a function
    IllegalTypeOfArgument,
    /// Wrong number of arguments
    NumberOfArgumentsMismatch,
    /// Subquery nesting deeper than allowed
    TooDeepSubqueries,
    /// IN operand arity differs from the left-hand tuple
    SetSizeMismatch,
    /// Required output column not produced by the query
    NoSuchColumn,
    /// Aggregate function used where it is not allowed
    IllegalAggregation,
    /// Expression shape not valid in its position
    IllegalExpression,
    /// UNION ALL branches disagree on structure
    UnionStructureMismatch,
    /// Table function unknown or called with bad arguments
    InvalidTableFunction,

    // Execution
    /// Integer division or modulo by zero
    IllegalDivision,
    /// GROUP BY produced more keys than allowed
    TooManyRowsToGroupBy,
    /// Set grew past its row limit
    TooManyRowsInSet,
    /// DISTINCT kept more rows than allowed
    TooManyRowsInDistinct,
    /// IN evaluated before its set was filled
    SetNotCreated,
    /// Any other failure while pulling blocks
    ExecutionFailed,

    // Resource
    /// Table dropped before its lock could be taken
    TableDropped,
    /// Structural change attempted while the table is read-locked
    TableStructureLocked,
}

impl QueryErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::UnsupportedJoin => "STAGE_UNSUPPORTED_JOIN",
            QueryErrorCode::UnknownTable => "STAGE_UNKNOWN_TABLE",
            QueryErrorCode::UnknownIdentifier => "STAGE_UNKNOWN_IDENTIFIER",
            QueryErrorCode::UnknownFunction => "STAGE_UNKNOWN_FUNCTION",
            QueryErrorCode::IllegalTypeOfArgument => "STAGE_ILLEGAL_TYPE_OF_ARGUMENT",
            QueryErrorCode::NumberOfArgumentsMismatch => "STAGE_NUMBER_OF_ARGUMENTS_MISMATCH",
            QueryErrorCode::TooDeepSubqueries => "STAGE_TOO_DEEP_SUBQUERIES",
            QueryErrorCode::SetSizeMismatch => "STAGE_SET_SIZE_MISMATCH",
            QueryErrorCode::NoSuchColumn => "STAGE_NO_SUCH_COLUMN",
            QueryErrorCode::IllegalAggregation => "STAGE_ILLEGAL_AGGREGATION",
            QueryErrorCode::IllegalExpression => "STAGE_ILLEGAL_EXPRESSION",
            QueryErrorCode::UnionStructureMismatch => "STAGE_UNION_STRUCTURE_MISMATCH",
            QueryErrorCode::InvalidTableFunction => "STAGE_INVALID_TABLE_FUNCTION",
            QueryErrorCode::IllegalDivision => "STAGE_ILLEGAL_DIVISION",
            QueryErrorCode::TooManyRowsToGroupBy => "STAGE_TOO_MANY_ROWS_TO_GROUP_BY",
            QueryErrorCode::TooManyRowsInSet => "STAGE_TOO_MANY_ROWS_IN_SET",
            QueryErrorCode::TooManyRowsInDistinct => "STAGE_TOO_MANY_ROWS_IN_DISTINCT",
            QueryErrorCode::SetNotCreated => "STAGE_SET_NOT_CREATED",
            QueryErrorCode::ExecutionFailed => "STAGE_EXECUTION_FAILED",
            QueryErrorCode::TableDropped => "STAGE_TABLE_DROPPED",
            QueryErrorCode::TableStructureLocked => "STAGE_TABLE_STRUCTURE_LOCKED",
        }
    }

    /// Returns the lifecycle phase this code belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryErrorCode::IllegalDivision
            | QueryErrorCode::TooManyRowsToGroupBy
            | QueryErrorCode::TooManyRowsInSet
            | QueryErrorCode::TooManyRowsInDistinct
            | QueryErrorCode::SetNotCreated
            | QueryErrorCode::ExecutionFailed => ErrorCategory::Execution,
            QueryErrorCode::TableDropped | QueryErrorCode::TableStructureLocked => {
                ErrorCategory::Resource
            }
            _ => ErrorCategory::Planning,
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Planning => Severity::Reject,
            ErrorCategory::Execution => Severity::Error,
            ErrorCategory::Resource => Severity::Fatal,
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error with code and message
#[derive(Debug, Clone)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
}

impl QueryError {
    /// Create an error with an explicit code
    pub fn new(code: QueryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// JOIN in FROM
    pub fn unsupported_join() -> Self {
        Self::new(
            QueryErrorCode::UnsupportedJoin,
            "JOIN is not supported by the SELECT interpreter",
        )
    }

    /// Unknown database.table
    pub fn unknown_table(database: &str, table: &str) -> Self {
        Self::new(
            QueryErrorCode::UnknownTable,
            format!("Table {}.{} doesn't exist", database, table),
        )
    }

    /// Unresolvable column name
    pub fn unknown_identifier(name: &str) -> Self {
        Self::new(
            QueryErrorCode::UnknownIdentifier,
            format!("Unknown identifier: {}", name),
        )
    }

    /// Unknown function name
    pub fn unknown_function(name: &str) -> Self {
        Self::new(
            QueryErrorCode::UnknownFunction,
            format!("Unknown function {}", name),
        )
    }

    /// Bad argument type
    pub fn illegal_type(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::IllegalTypeOfArgument, reason)
    }

    /// Bad argument count
    pub fn arguments_mismatch(function: &str, expected: &str, got: usize) -> Self {
        Self::new(
            QueryErrorCode::NumberOfArgumentsMismatch,
            format!(
                "Function {} expects {} argument(s), passed {}",
                function, expected, got
            ),
        )
    }

    /// Nesting limit exceeded
    pub fn too_deep_subqueries(depth: usize, max: usize) -> Self {
        Self::new(
            QueryErrorCode::TooDeepSubqueries,
            format!("Subquery depth {} exceeds maximum {}", depth, max),
        )
    }

    /// IN operand arity mismatch
    pub fn set_size_mismatch(expected: usize, got: usize) -> Self {
        Self::new(
            QueryErrorCode::SetSizeMismatch,
            format!(
                "Number of columns in IN section doesn't match: {} at left, {} at right",
                expected, got
            ),
        )
    }

    /// Required column not produced
    pub fn no_such_column(name: &str) -> Self {
        Self::new(
            QueryErrorCode::NoSuchColumn,
            format!("There is no column '{}' in the query result", name),
        )
    }

    /// Misplaced aggregate function
    pub fn illegal_aggregation(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::IllegalAggregation, reason)
    }

    /// Misplaced expression
    pub fn illegal_expression(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::IllegalExpression, reason)
    }

    /// UNION ALL branch disagreement
    pub fn union_mismatch(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::UnionStructureMismatch, reason)
    }

    /// Bad table function
    pub fn invalid_table_function(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::InvalidTableFunction, reason)
    }

    /// Division by zero
    pub fn illegal_division() -> Self {
        Self::new(QueryErrorCode::IllegalDivision, "Division by zero")
    }

    /// Too many distinct keys
    pub fn too_many_rows_to_group_by(limit: usize) -> Self {
        Self::new(
            QueryErrorCode::TooManyRowsToGroupBy,
            format!("Limit for rows to group by exceeded: max {}", limit),
        )
    }

    /// Set limit exceeded
    pub fn too_many_rows_in_set(limit: usize) -> Self {
        Self::new(
            QueryErrorCode::TooManyRowsInSet,
            format!("Limit for rows in set exceeded: max {}", limit),
        )
    }

    /// DISTINCT limit exceeded
    pub fn too_many_rows_in_distinct(limit: usize) -> Self {
        Self::new(
            QueryErrorCode::TooManyRowsInDistinct,
            format!("Limit for rows in DISTINCT exceeded: max {}", limit),
        )
    }

    /// Set read before filled
    pub fn set_not_created(name: &str) -> Self {
        Self::new(
            QueryErrorCode::SetNotCreated,
            format!("Set {} is not created yet", name),
        )
    }

    /// Generic execution failure
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::ExecutionFailed, reason)
    }

    /// Lock acquisition on a dropped table
    pub fn table_dropped(name: &str) -> Self {
        Self::new(
            QueryErrorCode::TableDropped,
            format!("Table {} was dropped", name),
        )
    }

    /// Structural change while queries hold the table
    pub fn table_structure_locked(name: &str, readers: usize) -> Self {
        Self::new(
            QueryErrorCode::TableStructureLocked,
            format!("Table {} is locked by {} running queries", name, readers),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    /// Returns the lifecycle phase
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether this error was raised during planning
    pub fn is_planning(&self) -> bool {
        self.category() == ErrorCategory::Planning
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for QueryError {}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            QueryErrorCode::UnsupportedJoin.category(),
            ErrorCategory::Planning
        );
        assert_eq!(
            QueryErrorCode::IllegalDivision.category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            QueryErrorCode::TableDropped.category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn test_severity_follows_category() {
        assert_eq!(QueryError::unsupported_join().severity(), Severity::Reject);
        assert_eq!(QueryError::illegal_division().severity(), Severity::Error);
        assert_eq!(QueryError::table_dropped("t").severity(), Severity::Fatal);
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::set_size_mismatch(2, 1);
        let display = format!("{}", err);
        assert!(display.contains("REJECT"));
        assert!(display.contains("STAGE_SET_SIZE_MISMATCH"));
        assert!(display.contains("2 at left"));
    }
}
