#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{CoreError, CoreResult};

pub mod paths;

pub mod source_config;
pub use source_config::SourceConfig;

pub mod import_parser;
pub use import_parser::ImportParser;

pub mod transpiler;
pub use transpiler::Transpiler;

pub mod exports;
pub use exports::{ExportCache, ExportInfo};

pub mod rewriter;
pub use rewriter::RewriteTarget;

pub mod cache;
pub use cache::{CacheStore, Manifest};

pub mod file_record;
pub use file_record::{FileRecord, FileState, FileType, Layer};

pub mod graph;
pub use graph::DependencyGraph;

pub mod special_files;
pub use special_files::SpecialFilesIndex;

pub mod watcher;
pub use watcher::{WatchBatch, WatchConfig};

pub mod file_ops;
pub use file_ops::FileTable;

pub mod dynamic_import;
pub use dynamic_import::{DynamicImportHelper, HostBindings, HostModule};

pub mod module_loader;
pub use module_loader::ModuleLoader;

pub mod connectors;
pub use connectors::{Connector, ConnectorRegistry};

pub mod health;
pub use health::HealthCheckerHost;

pub mod reload;
pub use reload::{execute_batch, ReloadOutcome};

pub mod config;
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};

pub mod orchestrator;
pub use orchestrator::Orchestrator;

pub mod report;

#[cfg(feature = "test-util")]
pub mod test_util;
