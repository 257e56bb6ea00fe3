//! # Neurograph: Graph-driven Trial Execution Engine
//!
//! Neurograph compiles networks of interconnected mechanisms into executable
//! systems: it builds an acyclic execution graph out of an arbitrarily
//! cyclic topology, classifies every node's structural role, derives a
//! separate learning graph with objective-node elision, and runs trials in
//! processing, learning, and control phases with lazy evaluation across
//! cycle edges.
//!
//! ## Core Concepts
//!
//! - **Mechanisms**: Async units mapping input-port values to output-port
//!   values, registered with a [`NodeClass`](types::NodeClass)
//! - **Projections**: Directed, optionally weighted connections between
//!   ports, or onto another projection's weight
//! - **Pathways**: Ordered chains of mechanisms; the unit of graph seeding
//!   and of learning configuration
//! - **System**: The compiled artifact (graphs, roles, slots), immutable
//!   across runs
//! - **TrialRunner**: Per-run state and the three-phase trial loop
//!
//! ## Quick Start
//!
//! ```
//! use neurograph::graphs::SystemBuilder;
//! use neurograph::pathway::Pathway;
//! use neurograph::runtime::RunConfig;
//! use neurograph::utils::testing::{adder, doubler};
//! use rustc_hash::FxHashMap;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! let system = SystemBuilder::new("demo")
//!     .add_processing("in", vec![2], 1, doubler())
//!     .add_processing("out", vec![2], 1, adder())
//!     .add_pathway(Pathway::new("main", ["in", "out"]))
//!     .compile()?;
//!
//! let inputs = vec![FxHashMap::from_iter([(
//!     "in".into(),
//!     vec![vec![1.0, 2.0]],
//! )])];
//! let report = system.run(&inputs, RunConfig::default()).await?;
//! assert_eq!(report.output(0, &"out".into()), Some(&vec![vec![2.0, 4.0]]));
//! # Ok(())
//! # }
//! ```

pub mod event_bus;
pub mod graphs;
pub mod mechanism;
pub mod pathway;
pub mod projection;
pub mod registry;
pub mod runtime;
pub mod system;
pub mod telemetry;
pub mod types;
pub mod utils;
