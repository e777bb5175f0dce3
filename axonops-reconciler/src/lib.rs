//! Converges declarative AxonOps monitoring configuration (alert rules, health
//! checks, backups and notification integrations) against the control-plane API.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod model;
pub mod reconciler;
pub mod resolver;

pub use client::ControlPlaneClient;
pub use config::ClientConfig;
pub use engine::{Engine, RunReport};
pub use error::{Error, Result};
pub use model::{ClusterContext, ClusterType, Connection, Descriptor, Resource, ResourceKind};
pub use reconciler::Outcome;
