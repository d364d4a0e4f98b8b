#![warn(missing_docs, missing_debug_implementations)]

//! Check random Minecraft usernames for availability.
//!
//! A run generates a set of distinct random names, looks each one up against
//! the Mojang profile API with a bounded number of requests in flight, appends
//! every classified result to a results log as it arrives, and appends the
//! available names to a separate list once the whole batch has finished.
//!
//! # Example
//!
//! ```no_run
//! use mc_avail::check::Client;
//! use mc_avail::run::{RunConfig, run};
//! use mc_avail::sink::ResultSink;
//!
//! let config = RunConfig::new(100, 4, 50)?;
//! let sink = ResultSink::open("random_results.txt", "available_ids.txt")?;
//! let summary = run(&Client::new(), &config, &sink)?;
//! println!("{} of {} names are available", summary.available_count, summary.total_checked);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod check;
pub mod dispatch;
pub mod generate;
pub mod run;
pub mod sink;
