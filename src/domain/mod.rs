//! Domain models for rollout timelines
//!
//! Contains the core scheduling logic without any I/O concerns.

mod events;
mod graph;
mod id;
mod item;
mod milestone;
mod progress;
mod resolver;
mod stage;
mod timeline;
mod validation;

pub use events::{EventBus, EventKind, SubscriptionId, TimelineEvent, TimelineObserver};
pub use graph::{DependencyGraph, GraphError};
pub use id::{IdError, ItemId, TimelineId};
pub use item::{
    parse_date, DateError, Dependencies, Dependency, DependencyType, ItemCore, ItemMeta,
    ItemStatus, Priority, TransitionError,
};
pub use milestone::Milestone;
pub use progress::{
    DetailedProgress, EqualWeight, PriorityBased, ProgressStrategy, ProgressTracker,
    StrategyKind, TimeBased,
};
pub use resolver::{item_duration, CriticalPath, DependencyResolver, ResolverError};
pub use stage::{FlagValue, Metric, Resource, Stage, StageError, StageTask};
pub use timeline::{ErrorKind, Timeline, TimelineDocument, TimelineError, TimelineItem};
pub use validation::{ValidationIssue, ValidationReport, ValidationWarning};
