//! Agent execution core for Tandem.
//!
//! Drives LLM-directed agents through a step loop: stream a model response,
//! sequence the emitted tool calls so their side effects land in emission
//! order, spawn child agents (parallel or inline), and delegate client-side
//! tools over a persistent connection.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod events;
pub mod history;
pub mod protocol;
pub mod runtime;
pub mod sequencer;
pub mod session;
mod spawner;
pub mod state;
pub mod step_loop;
pub mod steps;
pub mod subgoals;
pub mod template;
pub mod tools;
pub mod truncation;

pub use bridge::*;
pub use config::*;
pub use errors::*;
pub use events::*;
pub use history::*;
pub use protocol::*;
pub use runtime::*;
pub use sequencer::*;
pub use session::*;
pub use state::*;
pub use step_loop::*;
pub use steps::*;
pub use subgoals::*;
pub use template::*;
pub use tools::*;
pub use truncation::*;
