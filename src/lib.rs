//! Rollout Timeline - dependency-aware planning for staged deployments
//!
//! A timeline is made of stages (phases with tasks, resources, metrics and
//! feature flags) and milestones (dated checkpoints), linked by typed
//! dependencies. The engine gates transitions on those dependencies,
//! computes critical paths, completion estimates and progress, and fires
//! templated notifications when things happen.

pub mod cli;
pub mod domain;
pub mod notify;
pub mod storage;

pub use domain::{
    Dependency, DependencyResolver, DependencyType, ItemId, ItemStatus, Milestone, Priority,
    Stage, Timeline, TimelineError, TimelineId,
};
