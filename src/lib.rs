//! Core library for the bonus-report command line application.
//!
//! Loyalty-bonus exports are loaded and normalized by [`io::excel_read`],
//! narrowed by [`filter`], validated by [`clean`], and rolled up per month by
//! [`report`]. [`pipeline`] ties the stages together and hands the result to
//! [`io::excel_write`]. Configuration lives in [`settings`], month naming in
//! [`locale`].

pub mod clean;
pub mod error;
pub mod filter;
pub mod io;
pub mod locale;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod settings;

pub use error::{ReportError, Result};
