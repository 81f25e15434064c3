//! Core of the Gyani interviewer: the session state machine and everything it
//! orchestrates, with every device and model backend behind a trait.

pub mod capabilities;
pub mod coding;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generator;
pub mod integrity;
pub mod knowledge;
mod persist;
pub mod prompts;
pub mod rag;
pub mod registry;
pub mod session_state;
pub mod tone;
pub mod types;
pub mod vector_index;
pub mod voice;

pub use config::InterviewConfig;
pub use engine::{PostSessionHook, SessionEngine};
pub use error::{KnowledgeError, RegistryError};
pub use registry::{Collaborators, SessionHandle, SessionRegistry};
