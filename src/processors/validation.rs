use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::error;

use super::Processor;
use crate::error::{PackError, Result};
use crate::files::PackFile;

/// Rejects paths that collide once letter case is ignored.
#[derive(Default)]
pub struct ValidationProcessor {
    /// Case-folded path to every original spelling seen.
    seen: Mutex<BTreeMap<String, Vec<String>>>,
}

impl ValidationProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Processor for ValidationProcessor {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn on_file(&self, file: PackFile) -> Result<PackFile> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(file.path().to_lowercase())
            .or_default()
            .push(file.path().to_string());
        Ok(file)
    }

    async fn on_end(&mut self) -> Result<()> {
        let seen = self.seen.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<String> = Vec::new();
        for spellings in seen.values_mut().filter(|s| s.len() > 1) {
            spellings.sort();
            paths.extend(spellings.iter().cloned());
        }
        if paths.is_empty() {
            return Ok(());
        }
        error!(paths = ?paths, "Case-insensitive path collision");
        Err(PackError::DuplicatePaths { paths })
    }
}
