pub mod capability;
pub mod compiler;
pub mod config;
pub mod console;
pub mod error;
pub mod grammar;
pub mod parser;
pub mod project;
pub mod runtime;
pub mod sandbox;
pub mod tokenizer;
pub mod translator;
pub mod vm;

pub use config::Config;
pub use error::{Fault, FaultKind};
pub use sandbox::Sandbox;
pub use translator::translate;
