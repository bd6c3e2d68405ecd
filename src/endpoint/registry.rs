//! Target-type dispatch: a closed variant plus an explicit registry.
//!
//! The `file` tag is reserved and always routes to the built-in file
//! worker; every other tag must be registered up front, so a bad service
//! configuration fails at construction time instead of per-message.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::worker::Worker;

/// The distinguished target type served by the file channel.
pub const FILE_TARGET: &str = "file";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Custom(String),
}

impl TargetKind {
    pub fn parse(raw: &str) -> Self {
        if raw == FILE_TARGET {
            TargetKind::File
        } else {
            TargetKind::Custom(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TargetKind::File => FILE_TARGET,
            TargetKind::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates one fresh worker per accepted request.
pub type WorkerFactory = Box<dyn Fn() -> Box<dyn Worker> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("target type `{FILE_TARGET}` is reserved for the file channel")]
    ReservedTag,
    #[error("target type `{0}` is already registered")]
    DuplicateTag(String),
}

/// Maps custom target tags to worker factories.
#[derive(Default)]
pub struct WorkerRegistry {
    factories: BTreeMap<String, WorkerFactory>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        tag: impl Into<String>,
        factory: WorkerFactory,
    ) -> Result<(), RegistryError> {
        let tag = tag.into();
        if tag == FILE_TARGET {
            return Err(RegistryError::ReservedTag);
        }
        if self.factories.contains_key(&tag) {
            return Err(RegistryError::DuplicateTag(tag));
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    pub fn resolve(&self, tag: &str) -> Option<&WorkerFactory> {
        self.factories.get(tag)
    }

    /// Everything this service advertises at connect time, the file channel
    /// included.
    pub fn target_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.keys().cloned().collect();
        tags.push(FILE_TARGET.to_string());
        tags
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::CancelToken;
    use crate::proto::ErrorObject;
    use crate::worker::WorkerContext;

    struct NullWorker;

    impl Worker for NullWorker {
        fn can_process(&self, _target: &TargetKind, _value: &str) -> Result<(), Vec<ErrorObject>> {
            Ok(())
        }

        fn run(&mut self, _ctx: &WorkerContext, _cancel: &CancelToken) {}
    }

    fn null_factory() -> WorkerFactory {
        Box::new(|| Box::new(NullWorker))
    }

    #[test]
    fn file_tag_is_reserved() {
        let mut registry = WorkerRegistry::new();
        let err = registry.register(FILE_TARGET, null_factory()).unwrap_err();
        assert_eq!(err, RegistryError::ReservedTag);
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let mut registry = WorkerRegistry::new();
        registry.register("scan", null_factory()).unwrap();
        let err = registry.register("scan", null_factory()).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTag("scan".to_string()));
    }

    #[test]
    fn target_types_include_the_file_channel() {
        let mut registry = WorkerRegistry::new();
        registry.register("scan", null_factory()).unwrap();
        let tags = registry.target_types();
        assert!(tags.contains(&"scan".to_string()));
        assert!(tags.contains(&FILE_TARGET.to_string()));
        assert!(registry.resolve("scan").is_some());
        assert!(registry.resolve("ocr").is_none());
    }

    #[test]
    fn target_kind_parses_the_reserved_tag() {
        assert_eq!(TargetKind::parse("file"), TargetKind::File);
        assert_eq!(
            TargetKind::parse("scan"),
            TargetKind::Custom("scan".to_string())
        );
    }
}
