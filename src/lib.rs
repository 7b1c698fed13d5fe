//! # Forensic Assistant
//!
//! A bounded, session-scoped conversational query gateway over a fixed
//! forensics database. Questions in natural language are translated into a
//! single read-only SQLite statement by a language model, validated as
//! untrusted input, executed with row and time bounds, and recorded as turns
//! in a per-session history.
//!
//! ## Pipeline
//!
//! ```text
//! question
//!     ↓
//! [Gateway]        → request state machine, total time budget
//!     ↓
//! [Translator]     → completion call + extraction + validation → QueryPlan
//!     ↓
//! [Executor]       → read-only pool, row cap, statement timeout → QueryResult
//!     ↓
//! [format_answer]  → answer text
//!     ↓
//! [SessionHistory] → Turn appended in arrival order
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use forensic_assistant::{Config, Handler};
//!
//! let config = Config::load()?;
//! let handler = Handler::from_config(&config)?;
//! let session_id = handler.create_session()?;
//! let turn = handler.ask(&session_id, "Which drug types were seized in 2023?").await?;
//! println!("{}", turn.answer);
//! ```

pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod handler;
pub mod schema;
pub mod session;
pub mod translator;
pub mod value;

pub use completion::{CompletionClient, CompletionError, OpenAiClient, ScriptedCompletion};
pub use config::Config;
pub use error::{GatewayError, GatewayResult};
pub use executor::{ExecutionLimits, QueryExecutor, QueryResult};
pub use gateway::{format_answer, Gateway, RequestState};
pub use handler::Handler;
pub use schema::{SchemaCatalog, SchemaDescriptor};
pub use session::{Session, SessionHistory, SessionManager, Turn, TurnStatus};
pub use translator::{QueryPlan, Translator};
pub use value::Scalar;
