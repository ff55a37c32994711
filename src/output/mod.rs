//! Human-readable exports.
//!
//! JSON artifacts are written by their own modules through [`crate::artifact`];
//! this module holds the CSV views meant for review in a spreadsheet.

pub mod csv;

pub use csv::{CsvOutputError, DuplicateCsv, PlanCsv};
