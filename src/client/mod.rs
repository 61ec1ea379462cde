//! Chat client: the form controller and what it binds to.
//!
//! - [`surface`]: the page elements (query field, message log)
//! - [`transport`]: the `POST /chat` exchange
//! - [`controller`]: [`ChatFormController`], which ties the two together
//! - [`terminal`]: a stdin/stdout front end for the controller

pub mod controller;
pub mod surface;
pub mod terminal;
pub mod transport;

pub use controller::{ChatFormController, PendingTurn, ReplyOrdering, TurnOutcome};
pub use surface::{ChatSurface, MemorySurface, SurfaceEvent, TerminalSurface};
pub use transport::{Answer, ChatTransport, HttpTransport};
