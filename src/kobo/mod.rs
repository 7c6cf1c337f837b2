//! Kobo device protocol.
//!
//! Kobo e-readers speak an Instapaper/Pocket style API: they poll `get` for
//! their article list, `download` each article body, and push local state
//! changes through `send`. This module translates those calls into Readeck
//! requests.
//!
//! # Routes
//!
//! - `POST /get`: full or incremental sync of the article list
//! - `POST /download`: rewritten article HTML plus its image table
//! - `POST /send`: batch of archive/favorite/delete/add actions
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .nest("/api/kobo", kobo::routes())
//!     .with_state(app_state);
//! ```

pub mod action;
pub mod download;
mod extract;
mod handler;
pub mod model;
mod routes;
pub mod sync;

pub use routes::routes;
