//! 学生视力档案组合查询客户端
//!
//! 字段注册表 → 条件构建器 → 参数组装器 → 后端客户端 → 结果展示。

pub mod assembler;
pub mod builder;
pub mod catalog;
pub mod client;
pub mod command;
pub mod condition;
pub mod config;
pub mod error;
pub mod field;
pub mod lexer;
pub mod render;
pub mod session;
pub mod token;

pub use assembler::{Assembler, AssemblerConfig, QueryParams, QueryState, ViewKind};
pub use builder::{ConditionBuilder, ConditionSource, RowId};
pub use condition::{Condition, ConditionRole, ConditionValue, Operator};
pub use error::{ConfigError, QueryError, ValidationError};
pub use field::{FieldRegistry, FieldSpec, ValueKind};
