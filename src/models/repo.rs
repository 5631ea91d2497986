use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository identity as resolved by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Repo {
    /// Stable numeric identifier
    pub id: i32,

    /// Full repository name (e.g. "github.com/org/project")
    pub name: String,
}

impl Repo {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One revision requested for a repository.
///
/// Exactly one of the three fields is meaningful. An explicit specifier uses
/// `rev_spec` (a commit SHA, a branch or tag name, or the empty string for the
/// default branch). A non-explicit specifier uses `ref_glob` or
/// `exclude_ref_glob` and can never be served by the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionSpecifier {
    #[serde(default)]
    pub rev_spec: String,

    #[serde(default)]
    pub ref_glob: String,

    #[serde(default)]
    pub exclude_ref_glob: String,
}

impl RevisionSpecifier {
    /// Default branch
    pub fn head() -> Self {
        Self::default()
    }

    pub fn explicit(rev: impl Into<String>) -> Self {
        Self {
            rev_spec: rev.into(),
            ..Default::default()
        }
    }

    pub fn ref_glob(glob: impl Into<String>) -> Self {
        Self {
            ref_glob: glob.into(),
            ..Default::default()
        }
    }

    pub fn exclude_ref_glob(glob: impl Into<String>) -> Self {
        Self {
            exclude_ref_glob: glob.into(),
            ..Default::default()
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.ref_glob.is_empty() && self.exclude_ref_glob.is_empty()
    }

    /// Whether this specifier names the default branch
    pub fn is_head(&self) -> bool {
        self.is_explicit() && (self.rev_spec.is_empty() || self.rev_spec == "HEAD")
    }
}

impl fmt::Display for RevisionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exclude_ref_glob.is_empty() {
            write!(f, "*!{}", self.exclude_ref_glob)
        } else if !self.ref_glob.is_empty() {
            write!(f, "*{}", self.ref_glob)
        } else {
            f.write_str(&self.rev_spec)
        }
    }
}

/// A repository plus the ordered revisions to search in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRevisions {
    pub repo: Repo,

    #[serde(default)]
    pub revs: Vec<RevisionSpecifier>,
}

impl RepositoryRevisions {
    pub fn new(repo: Repo, revs: Vec<RevisionSpecifier>) -> Self {
        Self { repo, revs }
    }

    /// The repository at its default branch
    pub fn head(repo: Repo) -> Self {
        Self {
            repo,
            revs: vec![RevisionSpecifier::head()],
        }
    }

    pub fn name(&self) -> &str {
        &self.repo.name
    }

    /// Whether any revision is a ref-glob or an excluded ref-glob
    pub fn has_ref_globs(&self) -> bool {
        self.revs.iter().any(|rev| !rev.is_explicit())
    }

    /// Whether the only revision requested is the default branch
    pub fn is_default_branch_only(&self) -> bool {
        match self.revs.as_slice() {
            [] => true,
            [rev] => rev.is_explicit() && rev.rev_spec.is_empty(),
            _ => false,
        }
    }

    /// The single explicit revision, or the default branch when none is given
    pub fn single_rev(&self) -> Option<&str> {
        match self.revs.as_slice() {
            [] => Some(""),
            [rev] if rev.is_explicit() => Some(rev.rev_spec.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for RepositoryRevisions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo.name)?;
        if self.revs.iter().any(|rev| !rev.rev_spec.is_empty() || !rev.is_explicit()) {
            let revs: Vec<String> = self.revs.iter().map(|rev| rev.to_string()).collect();
            write!(f, "@{}", revs.join(":"))?;
        }
        Ok(())
    }
}
