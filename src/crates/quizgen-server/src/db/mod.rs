//! SQLite persistence
//!
//! - [`SqliteCheckpointSaver`] - durable [`CheckpointSaver`](quizgen_checkpoint::CheckpointSaver)
//! - [`QuizRepository`] - quiz records, implements [`ResultStore`](quizgen_core::ResultStore)
//! - [`WordRepository`] - owner-scoped vocabulary, implements [`WordSource`](quizgen_core::WordSource)

pub mod checkpoints;
pub mod connection;
pub mod error;
pub mod quizzes;
pub mod words;

pub use checkpoints::SqliteCheckpointSaver;
pub use connection::{DatabaseConnection, DatabasePool};
pub use error::{DatabaseError, DbResult};
pub use quizzes::QuizRepository;
pub use words::WordRepository;
