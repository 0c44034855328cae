//! Time tiled array job orchestration for grid based single column model runs.
//!
//! Every element of an array job works on one time window. The window is
//! derived from the element's array index by [`timing::compute_start_time`],
//! which all stages share:
//!
//! - [`launcher`] submits the model run array and the post-processing array
//!   that waits for the whole run array to finish
//! - [`element`] runs one stage program for one element with a materialized config
//! - [`cleaner`] removes stale tile output of one window
//! - [`collect`] reports the state of a launch from its logs

pub mod array_spec;
pub mod cleaner;
pub mod collect;
pub mod config;
pub mod context;
pub mod element;
pub mod exit;
pub mod launcher;
pub mod materialize;
pub mod scheduler;
pub mod submitter;
pub mod template;
pub mod timing;
