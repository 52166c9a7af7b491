//! Global project dependency map.
//!
//! Loaded once per run from bulk package-registry datasets (projects,
//! package dependencies, repository dependencies) and memoized to a JSON
//! quick-load file, since scanning the bulk CSVs takes far longer than
//! any single mining run. Read-only after load and shared across workers
//! behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepsError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dependency data in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("bulk dependency dataset not found: {0}")]
    MissingBulk(PathBuf),
}

/// Paths to the bulk datasets the slow rebuild reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPaths {
    /// Projects-with-repository-fields CSV; maps project ids to repo names.
    pub projects: PathBuf,
    /// Package-level dependency CSV (`Project ID` → `Dependency Project ID`).
    pub dependencies: PathBuf,
    /// Repository-level dependency CSV (repo name → dependency project id).
    pub repository_dependencies: PathBuf,
}

/// Immutable project dependency relation, keyed by project id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DependencyMap {
    /// Lowercased `owner/repo` → project id.
    name_to_id: HashMap<String, String>,
    /// Project id → ids of projects it depends on. Inverse lookups swap
    /// the arguments instead of keeping a second relation.
    depends_on: HashMap<String, HashSet<String>>,
}

impl DependencyMap {
    /// Loads from the quick-load cache, falling back to the slow bulk
    /// rebuild (and regenerating the cache) when the cache is absent or
    /// unreadable. Fails only when the bulk sources are missing too.
    pub fn load(cache_path: &Path, bulk: &BulkPaths) -> Result<Self, DepsError> {
        match Self::load_cache(cache_path) {
            Ok(map) => {
                info!(
                    "loaded dependency cache: {} projects, {} with dependencies",
                    map.name_to_id.len(),
                    map.depends_on.len()
                );
                return Ok(map);
            }
            Err(err) => {
                warn!("dependency quick-load failed ({err}), rebuilding from bulk datasets");
            }
        }
        let map = Self::build_from_bulk(bulk)?;
        if let Err(err) = map.save_cache(cache_path) {
            warn!("could not write dependency cache: {err}");
        }
        Ok(map)
    }

    pub fn load_cache(cache_path: &Path) -> Result<Self, DepsError> {
        let content = fs::read_to_string(cache_path).map_err(|source| DepsError::Io {
            path: cache_path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|err| DepsError::Malformed {
            path: cache_path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn save_cache(&self, cache_path: &Path) -> Result<(), DepsError> {
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).map_err(|source| DepsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string(self).map_err(|err| DepsError::Malformed {
            path: cache_path.to_path_buf(),
            reason: err.to_string(),
        })?;
        fs::write(cache_path, content).map_err(|source| DepsError::Io {
            path: cache_path.to_path_buf(),
            source,
        })
    }

    /// Rebuilds the relation from the bulk CSV datasets.
    pub fn build_from_bulk(bulk: &BulkPaths) -> Result<Self, DepsError> {
        for path in [
            &bulk.projects,
            &bulk.dependencies,
            &bulk.repository_dependencies,
        ] {
            if !path.exists() {
                return Err(DepsError::MissingBulk(path.clone()));
            }
        }

        let mut map = DependencyMap::default();
        map.read_projects(&bulk.projects)?;
        let package_edges = map.read_package_dependencies(&bulk.dependencies)?;
        let repo_edges = map.read_repository_dependencies(&bulk.repository_dependencies)?;
        info!(
            "rebuilt dependency map: {} projects, {} package edges, {} repository edges",
            map.name_to_id.len(),
            package_edges,
            repo_edges
        );
        Ok(map)
    }

    fn read_projects(&mut self, path: &Path) -> Result<(), DepsError> {
        let mut reader = csv_reader(path)?;
        let headers = headers(&mut reader, path)?;
        let id_idx = column(&headers, "ID", path)?;
        let name_idx = column(&headers, "Repository Name with Owner", path)?;
        for record in reader.records() {
            let record = record.map_err(|err| malformed(path, err))?;
            let (Some(id), Some(name)) = (record.get(id_idx), record.get(name_idx)) else {
                continue;
            };
            if !name.is_empty() {
                self.name_to_id
                    .insert(name.to_lowercase(), id.to_string());
            }
        }
        Ok(())
    }

    fn read_package_dependencies(&mut self, path: &Path) -> Result<u64, DepsError> {
        let mut reader = csv_reader(path)?;
        let headers = headers(&mut reader, path)?;
        let focal_idx = column(&headers, "Project ID", path)?;
        let other_idx = column(&headers, "Dependency Project ID", path)?;
        let mut edges = 0;
        for record in reader.records() {
            let record = record.map_err(|err| malformed(path, err))?;
            let (Some(focal), Some(other)) = (record.get(focal_idx), record.get(other_idx)) else {
                continue;
            };
            if self.insert_edge(focal, other) {
                edges += 1;
            }
        }
        Ok(edges)
    }

    fn read_repository_dependencies(&mut self, path: &Path) -> Result<u64, DepsError> {
        let mut reader = csv_reader(path)?;
        let headers = headers(&mut reader, path)?;
        let repo_idx = column(&headers, "Repository Name with Owner", path)?;
        let dep_idx = column(&headers, "Dependency Project ID", path)?;
        let mut edges = 0;
        let mut unknown_repos = 0u64;
        for record in reader.records() {
            let record = record.map_err(|err| malformed(path, err))?;
            let (Some(repo), Some(dep)) = (record.get(repo_idx), record.get(dep_idx)) else {
                continue;
            };
            let Some(repo_id) = self.name_to_id.get(&repo.to_lowercase()).cloned() else {
                unknown_repos += 1;
                continue;
            };
            if self.insert_edge(&repo_id, dep) {
                edges += 1;
            }
        }
        if unknown_repos > 0 {
            warn!("skipped {unknown_repos} repository dependencies with unknown repositories");
        }
        Ok(edges)
    }

    /// Records `focal depends on other`. Self-dependencies are dropped.
    fn insert_edge(&mut self, focal: &str, other: &str) -> bool {
        if focal.is_empty() || other.is_empty() || focal == other {
            return false;
        }
        self.depends_on
            .entry(focal.to_string())
            .or_default()
            .insert(other.to_string());
        true
    }

    pub fn project_count(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn edge_count(&self) -> usize {
        self.depends_on.values().map(HashSet::len).sum()
    }

    pub fn project_id(&self, project_name: &str) -> Option<&str> {
        self.name_to_id
            .get(&project_name.to_lowercase())
            .map(String::as_str)
    }

    /// Whether `focal` declares a dependency on `other` (both project names).
    /// Unknown names resolve to `false`.
    pub fn depends_on(&self, focal_name: &str, other_name: &str) -> bool {
        let (Some(focal), Some(other)) = (self.project_id(focal_name), self.project_id(other_name))
        else {
            return false;
        };
        self.depends_on
            .get(focal)
            .is_some_and(|deps| deps.contains(other))
    }

    #[cfg(test)]
    pub fn for_tests(edges: &[(&str, &str)]) -> Self {
        let mut map = DependencyMap::default();
        for (focal, other) in edges {
            let focal_id = format!("id-{focal}");
            let other_id = format!("id-{other}");
            map.name_to_id.insert(focal.to_lowercase(), focal_id.clone());
            map.name_to_id.insert(other.to_lowercase(), other_id.clone());
            map.insert_edge(&focal_id, &other_id);
        }
        map
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<fs::File>, DepsError> {
    csv::Reader::from_path(path).map_err(|err| DepsError::Malformed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn headers(reader: &mut csv::Reader<fs::File>, path: &Path) -> Result<csv::StringRecord, DepsError> {
    reader
        .headers()
        .map(|h| h.clone())
        .map_err(|err| malformed(path, err))
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, DepsError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DepsError::Malformed {
            path: path.to_path_buf(),
            reason: format!("missing column {name:?}"),
        })
}

fn malformed(path: &Path, err: csv::Error) -> DepsError {
    DepsError::Malformed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Which project pairs an ecosystem-experience aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    /// Every project except the event's own.
    Ecosystem,
    /// Projects the event's project declares a dependency on.
    Dependency,
    /// Projects that declare a dependency on the event's project.
    InverseDependency,
    /// Projects with no declared dependency relation in either direction.
    NonDependency,
}

/// Decides which other-project experience buckets count toward an
/// aggregate, replacing the original's method-hijacking decorators with
/// an injected predicate.
#[derive(Clone)]
pub struct ProjectFilter {
    scope: ProjectScope,
    deps: Option<Arc<DependencyMap>>,
}

impl ProjectFilter {
    pub fn ecosystem() -> Self {
        Self {
            scope: ProjectScope::Ecosystem,
            deps: None,
        }
    }

    pub fn scoped(scope: ProjectScope, deps: Arc<DependencyMap>) -> Self {
        Self {
            scope,
            deps: Some(deps),
        }
    }

    /// True when experience gathered in `other_project` must not count
    /// toward an aggregate evaluated in `current_project`. The event's
    /// own project is always ignored.
    pub fn is_ignored(&self, current_project: &str, other_project: &str) -> bool {
        if current_project == other_project {
            return true;
        }
        let Some(deps) = &self.deps else {
            return false;
        };
        match self.scope {
            ProjectScope::Ecosystem => false,
            ProjectScope::Dependency => !deps.depends_on(current_project, other_project),
            ProjectScope::InverseDependency => !deps.depends_on(other_project, current_project),
            ProjectScope::NonDependency => {
                deps.depends_on(current_project, other_project)
                    || deps.depends_on(other_project, current_project)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cache_round_trip() {
        let map = DependencyMap::for_tests(&[("a/app", "b/lib")]);
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("deps.json");
        map.save_cache(&cache).unwrap();

        let reloaded = DependencyMap::load_cache(&cache).unwrap();
        assert!(reloaded.depends_on("a/app", "b/lib"));
        assert!(!reloaded.depends_on("b/lib", "a/app"));
    }

    #[test]
    fn bulk_rebuild_excludes_self_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let projects = dir.path().join("projects.csv");
        let deps = dir.path().join("deps.csv");
        let repo_deps = dir.path().join("repo_deps.csv");
        std::fs::write(
            &projects,
            "ID,Repository Name with Owner\n1,A/App\n2,b/lib\n3,c/tool\n",
        )
        .unwrap();
        std::fs::write(
            &deps,
            "Project ID,Dependency Project ID\n1,2\n2,2\n",
        )
        .unwrap();
        std::fs::write(
            &repo_deps,
            "Repository Name with Owner,Dependency Project ID\nc/tool,1\nunknown/repo,1\n",
        )
        .unwrap();

        let map = DependencyMap::build_from_bulk(&BulkPaths {
            projects,
            dependencies: deps,
            repository_dependencies: repo_deps,
        })
        .unwrap();

        assert!(map.depends_on("a/app", "b/lib"));
        assert!(!map.depends_on("b/lib", "b/lib"));
        assert!(map.depends_on("c/tool", "a/app"));
        assert_eq!(map.project_id("a/app"), Some("1"));
    }

    #[test]
    fn filter_scopes() {
        let deps = Arc::new(DependencyMap::for_tests(&[("a/app", "b/lib")]));

        let eco = ProjectFilter::ecosystem();
        assert!(eco.is_ignored("a/app", "a/app"));
        assert!(!eco.is_ignored("a/app", "z/other"));

        let dep = ProjectFilter::scoped(ProjectScope::Dependency, deps.clone());
        assert!(!dep.is_ignored("a/app", "b/lib"));
        assert!(dep.is_ignored("b/lib", "a/app"));
        assert!(dep.is_ignored("a/app", "z/unknown"));

        let inv = ProjectFilter::scoped(ProjectScope::InverseDependency, deps.clone());
        assert!(!inv.is_ignored("b/lib", "a/app"));
        assert!(inv.is_ignored("a/app", "b/lib"));

        let non = ProjectFilter::scoped(ProjectScope::NonDependency, deps);
        assert!(non.is_ignored("a/app", "b/lib"));
        assert!(!non.is_ignored("a/app", "z/unknown"));
    }
}
