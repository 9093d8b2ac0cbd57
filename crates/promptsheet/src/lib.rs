//! Spreadsheet engine with AI-triggered columns.
//!
//! A [`Sheet`](sheet::Sheet) holds an ordered list of columns and rows of
//! string cells. A column is either regular (user data) or an *AI trigger*:
//! it carries a prompt template such as
//! `"Is the student from a major in @Major an engineer?"`, and each of its
//! cells is filled by sending that prompt, rendered with the row's values, to
//! a model endpoint.
//!
//! # Getting started
//!
//! ```no_run
//! use promptsheet::prelude::*;
//! use std::sync::Mutex;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sheet = Mutex::new(PresetLibrary::builtin().instantiate("students")?);
//! let client = HttpCompleter::new(&ClientConfig::from_env())?;
//!
//! let report = sweep(&sheet, &client, &LoggingHandler).await;
//! println!("{} cell(s) updated", report.updated);
//!
//! // Nothing changed, so a second sweep makes no calls.
//! assert_eq!(sweep(&sheet, &client, &NoopHandler).await.attempted, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # How recomputation works
//!
//! Every AI cell remembers a fingerprint of the inputs it was last computed
//! from: the prompt text and the values of the columns the prompt mentions.
//! A cell is *pending* when its current fingerprint differs from the stored
//! one (or it was never computed). Editing a cell therefore only invalidates
//! the AI cells in the same row whose prompt references the edited column,
//! and changing a prompt invalidates its whole column.
//!
//! [`sweep`](sweep::sweep) computes every pending cell once, sequentially.
//! Results whose inputs changed during the call are dropped; failed calls
//! leave the cell untouched and pending.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | `@Column` placeholder parsing and rendering |
//! | [`sheet`] | Columns, rows, edits, dependency tracking, pending cells |
//! | [`sweep`] | The re-evaluation sweep and its report |
//! | [`client`] | [`Completer`](client::Completer) seam, HTTP and offline completers, retry |
//! | [`response`] | Turning a JSON answer into a cell value and note |
//! | [`events`] | Sweep events and handlers |
//! | [`preset`] | Built-in and file-loaded sheet presets |
//! | [`config`] | Endpoint, timeout and retry settings |

pub mod client;
pub mod config;
pub mod events;
pub mod prelude;
pub mod preset;
pub mod response;
pub mod sheet;
pub mod sweep;
pub mod template;
