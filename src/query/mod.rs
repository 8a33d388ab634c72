//! The Query Engine (component F): compiles a user expression into a
//! structured query and executes it against the [`crate::store::Store`].
//! Grammar lives in [`grammar`]; execution in [`exec`].

pub mod exec;
pub mod grammar;

pub use exec::{run, explain, DocumentSummary, QueryResult};
pub use grammar::Expr;
