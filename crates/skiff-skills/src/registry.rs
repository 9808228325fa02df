// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Layered skill registry.
//!
//! ## Discovery order (later sources take precedence on id collision)
//!
//! ```text
//! <builtin>/**/*.skill.md    (lowest)
//! <user>/**/*.skill.md
//! <project>/**/*.skill.md    (highest)
//! ```
//!
//! Each directory is walked recursively in sorted order so a load is
//! deterministic.  Missing directories are skipped.  A file that fails to
//! read or validate is recorded in [`RegistrySnapshot::errors`] and does not
//! affect the other files.
//!
//! ## Reloading
//!
//! [`SkillRegistry::load`] is single-flight: callers that arrive while a scan
//! is running await that scan instead of starting another one, and all of
//! them receive the same result.  The finished snapshot is published in one
//! write, so concurrent lookups see either the previous registry or the new
//! one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::definition::{parse, SkillDefinition, SkillSource, SKILL_FILE_SUFFIX};
use crate::snapshot::SnapshotCell;
use crate::SkillError;

/// Files larger than this are recorded as errors without being read.
pub const MAX_SKILL_FILE_BYTES: u64 = 256 * 1024; // 256 KB

/// The three directory roles a registry scans.  `None` disables a role.
#[derive(Debug, Clone, Default)]
pub struct SkillDirectories {
    pub builtin: Option<PathBuf>,
    pub user: Option<PathBuf>,
    pub project: Option<PathBuf>,
}

impl SkillDirectories {
    /// Configured directories, lowest precedence first.
    pub fn ordered(&self) -> Vec<(SkillSource, PathBuf)> {
        [
            (SkillSource::Builtin, &self.builtin),
            (SkillSource::User, &self.user),
            (SkillSource::Project, &self.project),
        ]
        .into_iter()
        .filter_map(|(source, dir)| dir.clone().map(|d| (source, d)))
        .collect()
    }
}

/// A file that could not be loaded during the last scan.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    pub file: PathBuf,
    pub error: SkillError,
}

/// Immutable registry contents produced by one scan.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub skills: HashMap<String, SkillDefinition>,
    pub errors: Vec<LoadError>,
}

impl RegistrySnapshot {
    fn non_builtin_count(&self) -> usize {
        self.skills
            .values()
            .filter(|s| s.source != Some(SkillSource::Builtin))
            .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillStatistics {
    pub total: usize,
    pub builtin: usize,
    pub user: usize,
    pub project: usize,
    pub with_trigger_keywords: usize,
    pub load_errors: usize,
}

type LoadFuture = Shared<BoxFuture<'static, Result<usize, SkillError>>>;

struct Inner {
    dirs: SkillDirectories,
    snapshot: SnapshotCell<RegistrySnapshot>,
    /// The scan currently in flight, tagged with its generation.
    in_flight: Mutex<Option<(u64, LoadFuture)>>,
    generation: AtomicU64,
    scans: AtomicUsize,
}

/// Registry of skill definitions loaded from the configured directories.
///
/// Cloning is cheap; clones share the same snapshot and in-flight scan.
#[derive(Clone)]
pub struct SkillRegistry {
    inner: Arc<Inner>,
}

impl SkillRegistry {
    /// An empty registry.  Nothing is read until [`load`](Self::load).
    pub fn new(dirs: SkillDirectories) -> Self {
        Self {
            inner: Arc::new(Inner {
                dirs,
                snapshot: SnapshotCell::default(),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                scans: AtomicUsize::new(0),
            }),
        }
    }

    pub fn directories(&self) -> &SkillDirectories {
        &self.inner.dirs
    }

    /// Rescan every configured directory and replace the registry contents.
    ///
    /// Returns the number of effective skills whose source is not built-in.
    pub async fn load(&self) -> Result<usize, SkillError> {
        let (generation, scan) = {
            let mut slot = self.inner.in_flight.lock().expect("skill load lock poisoned");
            match slot.as_ref() {
                Some((generation, scan)) => {
                    debug!(generation, "joining in-flight skill scan");
                    (*generation, scan.clone())
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
                    let scan = Self::start_scan(Arc::clone(&self.inner));
                    *slot = Some((generation, scan.clone()));
                    (generation, scan)
                }
            }
        };

        let result = scan.await;

        let mut slot = self.inner.in_flight.lock().expect("skill load lock poisoned");
        if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
            *slot = None;
        }
        result
    }

    fn start_scan(inner: Arc<Inner>) -> LoadFuture {
        async move {
            inner.scans.fetch_add(1, Ordering::SeqCst);
            let dirs = inner.dirs.clone();
            let snapshot = tokio::task::spawn_blocking(move || scan_directories(&dirs))
                .await
                .map_err(|e| SkillError::ScanAborted(e.to_string()))?;
            let count = snapshot.non_builtin_count();
            info!(
                skills = snapshot.skills.len(),
                errors = snapshot.errors.len(),
                non_builtin = count,
                "skill registry loaded"
            );
            inner.snapshot.set(snapshot);
            Ok(count)
        }
        .boxed()
        .shared()
    }

    /// The current snapshot.  Stays valid across later reloads.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.snapshot.get()
    }

    pub fn lookup(&self, id: &str) -> Option<SkillDefinition> {
        self.snapshot().skills.get(id).cloned()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.snapshot().skills.contains_key(id)
    }

    /// All effective skills, sorted by id.
    pub fn list(&self) -> Vec<SkillDefinition> {
        let snapshot = self.snapshot();
        let mut skills: Vec<SkillDefinition> = snapshot.skills.values().cloned().collect();
        skills.sort_by(|a, b| a.id.cmp(&b.id));
        skills
    }

    /// Files rejected by the last completed scan.
    pub fn errors(&self) -> Vec<LoadError> {
        self.snapshot().errors.clone()
    }

    pub fn statistics(&self) -> SkillStatistics {
        let snapshot = self.snapshot();
        let mut stats = SkillStatistics {
            total: snapshot.skills.len(),
            load_errors: snapshot.errors.len(),
            ..SkillStatistics::default()
        };
        for skill in snapshot.skills.values() {
            match skill.source {
                Some(SkillSource::Builtin) => stats.builtin += 1,
                Some(SkillSource::User) => stats.user += 1,
                Some(SkillSource::Project) => stats.project += 1,
                None => {}
            }
            if !skill.trigger_keywords.is_empty() {
                stats.with_trigger_keywords += 1;
            }
        }
        stats
    }

    /// Ids of skills with a trigger keyword occurring in `text`, sorted.
    pub fn find_by_keyword(&self, text: &str) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut ids: Vec<String> = snapshot
            .skills
            .values()
            .filter(|s| s.matches_keywords(text))
            .map(|s| s.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of physical directory scans started so far.
    pub fn scans_performed(&self) -> usize {
        self.inner.scans.load(Ordering::SeqCst)
    }
}

// ── Scanning ──────────────────────────────────────────────────────────────────

fn scan_directories(dirs: &SkillDirectories) -> RegistrySnapshot {
    let mut snapshot = RegistrySnapshot::default();
    for (source, dir) in dirs.ordered() {
        if !dir.is_dir() {
            debug!(%source, path = %dir.display(), "skill directory absent, skipping");
            continue;
        }
        scan_one(&dir, source, &mut snapshot);
    }
    snapshot
}

fn scan_one(root: &Path, source: SkillSource, snapshot: &mut RegistrySnapshot) {
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let file = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(%source, path = %file.display(), error = %e, "failed to walk skill directory");
                snapshot.errors.push(LoadError {
                    error: SkillError::Io { path: file.display().to_string(), message: e.to_string() },
                    file,
                });
                continue;
            }
        };
        let path = entry.path();
        let is_skill = entry.file_type().is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SKILL_FILE_SUFFIX));
        if !is_skill {
            continue;
        }

        match load_file(path) {
            Ok(mut skill) => {
                skill.source = Some(source);
                if let Some(previous) = snapshot.skills.get(&skill.id) {
                    debug!(
                        id = %skill.id,
                        %source,
                        overridden = %previous.source_path.display(),
                        "skill overrides earlier definition"
                    );
                }
                snapshot.skills.insert(skill.id.clone(), skill);
            }
            Err(error) => {
                warn!(%source, path = %path.display(), error = %error, "skipping invalid skill");
                snapshot.errors.push(LoadError { file: path.to_path_buf(), error });
            }
        }
    }
}

fn load_file(path: &Path) -> Result<SkillDefinition, SkillError> {
    let io_error = |message: String| SkillError::Io { path: path.display().to_string(), message };
    let size = path.metadata().map_err(|e| io_error(e.to_string()))?.len();
    if size > MAX_SKILL_FILE_BYTES {
        return Err(io_error(format!(
            "file is {size} bytes, larger than the {MAX_SKILL_FILE_BYTES} byte limit"
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))?;
    parse(&text, path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::tests::skill_text;
    use std::fs;
    use tempfile::TempDir;

    fn write_skill(dir: &Path, file: &str, text: &str) {
        let path = dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn described(id: &str, tools: &[&str], description: &str) -> String {
        skill_text(id, tools, "").replace("Handles focused work for tests.", description)
    }

    struct Layout {
        _tmp: TempDir,
        builtin: PathBuf,
        user: PathBuf,
        project: PathBuf,
    }

    impl Layout {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let builtin = tmp.path().join("builtin");
            let user = tmp.path().join("user");
            let project = tmp.path().join("project");
            for d in [&builtin, &user, &project] {
                fs::create_dir_all(d).unwrap();
            }
            Self { _tmp: tmp, builtin, user, project }
        }

        fn registry(&self) -> SkillRegistry {
            SkillRegistry::new(SkillDirectories {
                builtin: Some(self.builtin.clone()),
                user: Some(self.user.clone()),
                project: Some(self.project.clone()),
            })
        }
    }

    // ── Precedence ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn project_overrides_user_overrides_builtin() {
        let l = Layout::new();
        write_skill(&l.builtin, "a.skill.md", &described("alpha", &["grep"], "Built-in alpha skill."));
        write_skill(&l.user, "a.skill.md", &described("alpha", &["grep"], "User alpha skill here."));
        write_skill(&l.project, "a.skill.md", &described("alpha", &["grep"], "Project alpha skill."));
        write_skill(&l.builtin, "b.skill.md", &described("beta", &["grep"], "Built-in beta skill."));
        write_skill(&l.user, "b.skill.md", &described("beta", &["grep"], "User beta skill here."));

        let reg = l.registry();
        let count = reg.load().await.unwrap();

        let alpha = reg.lookup("alpha").unwrap();
        assert_eq!(alpha.description, "Project alpha skill.");
        assert_eq!(alpha.source, Some(SkillSource::Project));
        let beta = reg.lookup("beta").unwrap();
        assert_eq!(beta.description, "User beta skill here.");
        assert_eq!(beta.source, Some(SkillSource::User));
        assert_eq!(count, 2, "both effective entries come from non-builtin sources");
    }

    #[tokio::test]
    async fn project_general_purpose_replaces_builtin_tool_list() {
        let l = Layout::new();
        write_skill(
            &l.builtin,
            "general-purpose.skill.md",
            &skill_text("general-purpose", &["read_file", "grep", "run_terminal_command"], ""),
        );
        write_skill(&l.project, "gp.skill.md", &skill_text("general-purpose", &["read_file"], ""));

        let reg = l.registry();
        reg.load().await.unwrap();
        let gp = reg.lookup("general-purpose").unwrap();
        assert_eq!(gp.tools, vec!["read_file"]);
        assert_eq!(gp.source, Some(SkillSource::Project));
    }

    #[tokio::test]
    async fn builtin_only_load_counts_zero() {
        let l = Layout::new();
        write_skill(&l.builtin, "x.skill.md", &skill_text("explore", &["glob"], ""));
        let reg = l.registry();
        assert_eq!(reg.load().await.unwrap(), 0);
        assert!(reg.exists("explore"));
    }

    // ── Single-flight ─────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_share_one_scan() {
        let l = Layout::new();
        for i in 0..200 {
            write_skill(&l.user, &format!("s{i:03}.skill.md"), &skill_text(&format!("skill-{i}"), &["grep"], ""));
        }
        let reg = l.registry();

        let loads = (0..8).map(|_| reg.load());
        let results = futures::future::join_all(loads).await;

        for r in &results {
            assert_eq!(r.as_ref().unwrap(), &200);
        }
        assert_eq!(reg.scans_performed(), 1);
        assert_eq!(reg.list().len(), 200);
    }

    #[tokio::test]
    async fn sequential_loads_rescan() {
        let l = Layout::new();
        write_skill(&l.user, "a.skill.md", &skill_text("alpha", &["grep"], ""));
        let reg = l.registry();
        reg.load().await.unwrap();
        fs::remove_file(l.user.join("a.skill.md")).unwrap();
        write_skill(&l.user, "b.skill.md", &skill_text("beta", &["grep"], ""));
        reg.load().await.unwrap();

        assert_eq!(reg.scans_performed(), 2);
        assert!(!reg.exists("alpha"), "reload replaces contents wholesale");
        assert!(reg.exists("beta"));
    }

    #[tokio::test]
    async fn snapshot_taken_before_reload_is_unchanged() {
        let l = Layout::new();
        write_skill(&l.user, "a.skill.md", &skill_text("alpha", &["grep"], ""));
        let reg = l.registry();
        reg.load().await.unwrap();
        let before = reg.snapshot();
        fs::remove_file(l.user.join("a.skill.md")).unwrap();
        reg.load().await.unwrap();
        assert!(before.skills.contains_key("alpha"));
        assert!(reg.snapshot().skills.is_empty());
    }

    #[tokio::test]
    async fn readers_see_previous_contents_while_reload_is_pending() {
        let l = Layout::new();
        write_skill(&l.user, "a.skill.md", &skill_text("alpha", &["grep"], ""));
        let reg = l.registry();
        reg.load().await.unwrap();

        for i in 0..200 {
            write_skill(&l.project, &format!("s{i:03}.skill.md"), &skill_text(&format!("skill-{i}"), &["grep"], ""));
        }
        let ids = |reg: &SkillRegistry| reg.list().into_iter().map(|s| s.id).collect::<Vec<_>>();

        let mut reload = Box::pin(reg.load());
        let count = loop {
            match futures::poll!(&mut reload) {
                std::task::Poll::Ready(result) => break result.unwrap(),
                std::task::Poll::Pending => {
                    assert_eq!(ids(&reg), vec!["alpha"], "scan in flight must not be visible");
                    assert!(reg.errors().is_empty());
                    tokio::task::yield_now().await;
                }
            }
        };

        assert_eq!(count, 201);
        assert_eq!(reg.list().len(), 201);
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_file_is_recorded_and_skipped() {
        let l = Layout::new();
        write_skill(&l.project, "good.skill.md", &skill_text("good", &["grep"], ""));
        write_skill(&l.project, "bad.skill.md", &skill_text("bad", &["grep"], "\n## Max Rounds\n150\n"));

        let reg = l.registry();
        assert_eq!(reg.load().await.unwrap(), 1);
        let errors = reg.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].file.ends_with("bad.skill.md"));
        assert!(errors[0].error.to_string().contains("out of range (150)"));
        assert!(!reg.exists("bad"));
    }

    #[tokio::test]
    async fn oversized_file_is_recorded() {
        let l = Layout::new();
        let mut text = skill_text("huge", &["grep"], "");
        text.push_str(&"x".repeat(MAX_SKILL_FILE_BYTES as usize));
        write_skill(&l.user, "huge.skill.md", &text);

        let reg = l.registry();
        reg.load().await.unwrap();
        assert!(!reg.exists("huge"));
        assert!(matches!(reg.errors()[0].error, SkillError::Io { .. }));
    }

    #[tokio::test]
    async fn missing_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let reg = SkillRegistry::new(SkillDirectories {
            builtin: Some(tmp.path().join("nope")),
            user: None,
            project: Some(tmp.path().join("also-nope")),
        });
        assert_eq!(reg.load().await.unwrap(), 0);
        assert!(reg.errors().is_empty());
    }

    // ── Scanning ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn nested_dirs_scanned_and_other_files_ignored() {
        let l = Layout::new();
        write_skill(&l.user, "team/review/reviewer.skill.md", &skill_text("reviewer", &["grep"], ""));
        write_skill(&l.user, "README.md", "# not a skill");
        write_skill(&l.user, "notes.skill.txt", "# not a skill either");

        let reg = l.registry();
        reg.load().await.unwrap();
        assert_eq!(reg.list().len(), 1);
        assert!(reg.errors().is_empty());
    }

    #[tokio::test]
    async fn crlf_files_load_like_lf_files() {
        let l = Layout::new();
        write_skill(&l.user, "lf.skill.md", &skill_text("lf", &["grep", "glob"], ""));
        write_skill(
            &l.user,
            "crlf.skill.md",
            &skill_text("crlf", &["grep", "glob"], "").replace('\n', "\r\n"),
        );
        let reg = l.registry();
        assert_eq!(reg.load().await.unwrap(), 2);
        assert_eq!(reg.lookup("crlf").unwrap().tools, reg.lookup("lf").unwrap().tools);
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn statistics_and_keyword_lookup() {
        let l = Layout::new();
        write_skill(&l.builtin, "a.skill.md", &skill_text("alpha", &["grep"], "\n## Trigger Keywords\nsecurity, audit\n"));
        write_skill(&l.user, "b.skill.md", &skill_text("beta", &["grep"], ""));
        write_skill(&l.project, "c.skill.md", &skill_text("gamma", &["grep"], "\n## Trigger Keywords\n- docs\n"));
        write_skill(&l.project, "d.skill.md", "# broken");

        let reg = l.registry();
        reg.load().await.unwrap();
        let stats = reg.statistics();
        assert_eq!(
            stats,
            SkillStatistics { total: 3, builtin: 1, user: 1, project: 1, with_trigger_keywords: 2, load_errors: 1 }
        );
        assert_eq!(reg.find_by_keyword("Run a SECURITY review"), vec!["alpha"]);
        assert!(reg.find_by_keyword("nothing relevant").is_empty());
    }

    #[test]
    fn empty_before_first_load() {
        let reg = SkillRegistry::new(SkillDirectories::default());
        assert!(reg.list().is_empty());
        assert_eq!(reg.statistics(), SkillStatistics::default());
        assert!(reg.lookup("general-purpose").is_none());
    }
}
