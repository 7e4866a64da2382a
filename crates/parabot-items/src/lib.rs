//! Execution item data model, plan grammar, and plan cache hashing (spec §3, §6).

pub mod error;
pub mod hashing;
pub mod planfile;
pub mod types;

pub use error::{ItemsError, Result};
pub use planfile::{PlanFile, PlanHeaders, CACHE_FILE_NAME};
pub use types::{
    fold_groups, names_equal, DynamicSuiteItem, DynamicTestItem, ExecutionItem, PlanNode, RunnerOptions, SuiteItem,
    SuiteItemsChunk, TestItem,
};
