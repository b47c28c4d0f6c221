//! The driver boundary: a minimal three-call surface any SQLite transport
//! can implement, plus fetch helpers that tie an [`Operation`] to a driver
//! and shape whatever comes back.
//!
//! Drivers wrap their native failures in [`QuillError::Driver`]; the core
//! never inspects them beyond that.

use quill_ast::Cardinality;
use quill_emit::{Operation, Params};
use quill_error::{QuillError, Result};
use quill_shape::{shape_all, shape_first, shape_maybe_first, shape_maybe_one, shape_one, Shaped, ShapedRows};
use quill_types::Row;

/// Outcome of a statement that returns no rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Rows changed.
    pub changes: u64,
    /// Rowid of the last insert, when the driver exposes one.
    pub last_insert_rowid: Option<i64>,
}

/// A prepared statement.
pub trait Statement {
    /// Execute without reading rows.
    fn run(&mut self, params: &Params) -> Result<RunOutcome>;
    /// Execute and collect every row.
    fn all(&mut self, params: &Params) -> Result<Vec<Row>>;
    /// Execute and return the first row, if any.
    fn get(&mut self, params: &Params) -> Result<Option<Row>>;
}

/// A connection-like handle that can prepare statements.
pub trait Driver {
    type Statement<'a>: Statement
    where
        Self: 'a;

    fn prepare(&self, sql: &str) -> Result<Self::Statement<'_>>;
}

/// Execute a row-less operation (DDL or DML).
pub fn run<D: Driver>(driver: &D, operation: &Operation) -> Result<RunOutcome> {
    let mut statement = driver.prepare(&operation.sql)?;
    statement.run(&operation.params)
}

/// Execute a query operation and shape under its declared cardinality.
pub fn fetch<D: Driver>(driver: &D, operation: &Operation) -> Result<ShapedRows> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    match operation.cardinality {
        Cardinality::All => shape_all(&rows, plan).map(ShapedRows::Many),
        Cardinality::One => shape_one(&rows, plan).map(ShapedRows::One),
        Cardinality::MaybeOne => shape_maybe_one(&rows, plan).map(ShapedRows::Maybe),
        Cardinality::First => shape_first(&rows, plan).map(ShapedRows::One),
        Cardinality::MaybeFirst => shape_maybe_first(&rows, plan).map(ShapedRows::Maybe),
    }
}

/// Execute and shape every row.
pub fn fetch_all<D: Driver>(driver: &D, operation: &Operation) -> Result<Vec<Shaped>> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    shape_all(&rows, plan)
}

/// Execute and shape exactly one row.
pub fn fetch_one<D: Driver>(driver: &D, operation: &Operation) -> Result<Shaped> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    shape_one(&rows, plan)
}

/// Execute and shape zero-or-one row.
pub fn fetch_maybe_one<D: Driver>(driver: &D, operation: &Operation) -> Result<Option<Shaped>> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    shape_maybe_one(&rows, plan)
}

/// Execute and shape the first row, failing when there is none.
pub fn fetch_first<D: Driver>(driver: &D, operation: &Operation) -> Result<Shaped> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    shape_first(&rows, plan)
}

/// Execute and shape the first row, if any.
pub fn fetch_maybe_first<D: Driver>(driver: &D, operation: &Operation) -> Result<Option<Shaped>> {
    let plan = operation_plan(operation)?;
    let rows = rows_for(driver, operation)?;
    shape_maybe_first(&rows, plan)
}

fn rows_for<D: Driver>(driver: &D, operation: &Operation) -> Result<Vec<Row>> {
    let mut statement = driver.prepare(&operation.sql)?;
    let rows = statement.all(&operation.params)?;
    tracing::debug!(rows = rows.len(), "fetched result rows");
    Ok(rows)
}

fn operation_plan(operation: &Operation) -> Result<&quill_ast::Plan> {
    operation
        .plan
        .as_ref()
        .ok_or_else(|| QuillError::driver("operation carries no reconstruction plan"))
}
