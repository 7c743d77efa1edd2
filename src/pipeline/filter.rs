use globset::{Glob, GlobSet, GlobSetBuilder};

/// Include/exclude shell-glob patterns over repository names.
///
/// A name passes when it matches some include pattern (or there are none) and
/// matches no exclude pattern.
#[derive(Debug, Clone)]
pub struct RepoFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl RepoFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, globset::Error> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    /// Accepts every repository.
    pub fn accept_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    pub fn admits(&self, name: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |set| set.is_match(name));
        let excluded = self.exclude.as_ref().is_some_and(|set| set.is_match(name));
        included && !excluded
    }
}

impl Default for RepoFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, globset::Error> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build().map(Some)
}
