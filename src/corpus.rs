//! JSON corpus loading for the in-memory services

use crate::error::{AppError, Result};
use crate::index::{InMemoryIndex, IndexedDocument, IndexedRepository};
use crate::models::{Repo, RepositoryRevisions};
use crate::unindexed::{BackendRepository, InMemoryBackend};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// An index entry: repository metadata plus its documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusIndexedRepo {
    pub repository: IndexedRepository,

    #[serde(default)]
    pub documents: Vec<IndexedDocument>,
}

/// Repositories the in-memory index and backend serve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    /// Backend search instances
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub indexed: Vec<CorpusIndexedRepo>,

    /// Repositories available to the unindexed backend
    #[serde(default)]
    pub repositories: Vec<BackendRepository>,
}

fn default_endpoints() -> Vec<String> {
    vec!["backend-0".to_string(), "backend-1".to_string()]
}

impl Corpus {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| AppError::Configuration(format!("corpus {}: {}", path.display(), e)))
    }

    /// Every repository name in the corpus, sorted, with stable ids
    pub fn repos(&self) -> Vec<RepositoryRevisions> {
        let names: BTreeSet<&str> = self
            .indexed
            .iter()
            .map(|r| r.repository.name.as_str())
            .chain(self.repositories.iter().map(|r| r.name.as_str()))
            .collect();
        names
            .into_iter()
            .enumerate()
            .map(|(id, name)| RepositoryRevisions::head(Repo::new(id as i32 + 1, name)))
            .collect()
    }

    pub fn into_services(self) -> (Arc<InMemoryIndex>, Arc<InMemoryBackend>) {
        let index = Arc::new(InMemoryIndex::new());
        for entry in self.indexed {
            index.add_repository(entry.repository, entry.documents);
        }

        let backend = Arc::new(InMemoryBackend::new(self.endpoints));
        for repo in self.repositories {
            backend.add_repository(repo);
        }
        (index, backend)
    }
}
