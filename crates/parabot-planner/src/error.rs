//! Error types for plan resolution and dependency planning.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("items error: {0}")]
    Items(#[from] parabot_items::ItemsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dependency {0:?} not found in plan or an ancestor stage")]
    UnmetDependency(String),

    #[error("item {0:?} depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle detected among: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("no data sources given")]
    NoDataSources,

    #[error("no tests to execute and empty-suite execution is disabled")]
    EmptyPlan,

    #[error("invalid shard spec: index {index} of {total}")]
    InvalidShard { index: usize, total: usize },

    #[error("too few items ({items}) to shard into {total} shards")]
    TooFewItemsToShard { items: usize, total: usize },

    #[error("dry-run discovery failed: {0}")]
    Discovery(String),
}
