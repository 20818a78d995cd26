//! Single-purpose model calls: intent, query extraction, calendar parsing.

pub mod calendar;
pub mod intent;
pub mod json;
pub mod search;
