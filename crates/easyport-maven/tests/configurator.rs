use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use easyport_core::{
    ProjectConfigurator, ProjectDescription, ProjectModel, ProjectModelError, ProjectRef,
};
use easyport_maven::{
    maven_update_worker, MavenProjectConfigurator, MavenProjectRegistry, MAVEN_NATURE_ID,
    POM_FILE_NAME,
};
use easyport_scheduler::{Executor, JobHandle, JobMonitor};
use parking_lot::Mutex;
use tempfile::TempDir;

#[derive(Default)]
struct MemoryModel {
    roots: HashMap<ProjectRef, PathBuf>,
    descriptions: Mutex<HashMap<ProjectRef, ProjectDescription>>,
    writes: AtomicUsize,
    read_only: HashSet<ProjectRef>,
}

impl MemoryModel {
    fn add(&mut self, name: &str, root: &Path, natures: &[&str]) -> ProjectRef {
        let project = ProjectRef::new(name);
        self.roots.insert(project.clone(), root.to_path_buf());
        self.descriptions.get_mut().insert(
            project.clone(),
            ProjectDescription {
                name: name.to_owned(),
                natures: natures.iter().map(|n| n.to_string()).collect(),
            },
        );
        project
    }

    fn natures(&self, project: &ProjectRef) -> Vec<String> {
        self.descriptions.lock()[project].natures.clone()
    }
}

impl ProjectModel for MemoryModel {
    fn location(&self, project: &ProjectRef) -> Option<PathBuf> {
        self.roots.get(project).cloned()
    }

    fn read_description(
        &self,
        project: &ProjectRef,
    ) -> Result<ProjectDescription, ProjectModelError> {
        self.descriptions
            .lock()
            .get(project)
            .cloned()
            .ok_or_else(|| ProjectModelError::UnknownProject(project.clone()))
    }

    fn write_description(
        &self,
        project: &ProjectRef,
        description: &ProjectDescription,
    ) -> Result<(), ProjectModelError> {
        if self.read_only.contains(project) {
            return Err(ProjectModelError::message("description is read-only"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.descriptions
            .lock()
            .insert(project.clone(), description.clone());
        Ok(())
    }
}

/// Runs jobs on the scheduling thread.
struct InlineExecutor;

impl Executor for InlineExecutor {
    fn schedule(&self, job: &JobHandle) {
        if job.try_schedule() {
            job.execute(&JobMonitor::detached());
        }
    }
}

/// Holds scheduled jobs until the test releases them.
#[derive(Default)]
struct DeferredExecutor {
    scheduled: Mutex<Vec<JobHandle>>,
}

impl DeferredExecutor {
    fn run_all(&self) {
        let scheduled = std::mem::take(&mut *self.scheduled.lock());
        for job in scheduled {
            job.execute(&JobMonitor::detached());
        }
    }
}

impl Executor for DeferredExecutor {
    fn schedule(&self, job: &JobHandle) {
        if job.try_schedule() {
            self.scheduled.lock().push(job.clone());
        }
    }
}

fn maven_dir(temp: &TempDir, name: &str, pom: &str) -> PathBuf {
    let root = temp.path().join(name);
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join(POM_FILE_NAME), pom).unwrap();
    root
}

fn simple_pom(artifact: &str) -> String {
    format!(
        "<project><groupId>com.example</groupId><artifactId>{artifact}</artifactId><version>1.0</version></project>"
    )
}

fn configurator(
    model: Arc<MemoryModel>,
    executor: Arc<dyn Executor>,
) -> (MavenProjectConfigurator, Arc<MavenProjectRegistry>) {
    let registry = Arc::new(MavenProjectRegistry::new());
    let worker = maven_update_worker(model.clone(), registry.clone(), executor, None);
    (MavenProjectConfigurator::new(model, worker), registry)
}

#[test]
fn configure_adds_nature_once_and_updates_the_project() {
    let temp = TempDir::new().unwrap();
    let root = maven_dir(&temp, "app", &simple_pom("app"));
    let mut model = MemoryModel::default();
    let app = model.add("app", &root, &["org.eclipse.jdt.core.javanature"]);
    let model = Arc::new(model);
    let (configurator, registry) = configurator(model.clone(), Arc::new(InlineExecutor));

    configurator.configure(&app);
    configurator.configure(&app);

    assert_eq!(
        model.natures(&app),
        vec![
            MAVEN_NATURE_ID.to_owned(),
            "org.eclipse.jdt.core.javanature".to_owned()
        ]
    );
    assert_eq!(model.writes.load(Ordering::SeqCst), 1);

    let facade = registry.get(&app).expect("app was updated");
    assert_eq!(facade.coordinates.as_deref(), Some("com.example:app:1.0"));
    assert_eq!(facade.pom, root.join(POM_FILE_NAME));
    assert!(configurator.worker().is_idle());
}

#[test]
fn projects_detected_before_the_worker_runs_share_one_batch() {
    let temp = TempDir::new().unwrap();
    let mut model = MemoryModel::default();
    let a = model.add("a", &maven_dir(&temp, "a", &simple_pom("a")), &[]);
    let b = model.add("b", &maven_dir(&temp, "b", &simple_pom("b")), &[]);
    let model = Arc::new(model);
    let executor = Arc::new(DeferredExecutor::default());
    let (configurator, registry) = configurator(model, executor.clone());

    configurator.configure(&a);
    configurator.configure(&b);
    configurator.configure(&a);
    assert_eq!(executor.scheduled.lock().len(), 1);
    assert_eq!(configurator.worker().pending_len(), 2);

    executor.run_all();

    assert!(registry.contains(&a));
    assert!(registry.contains(&b));
    let stats = configurator.worker().stats();
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.items, 2);
    assert_eq!(stats.failures, 0);
}

#[test]
fn description_write_failure_does_not_block_other_projects() {
    let temp = TempDir::new().unwrap();
    let mut model = MemoryModel::default();
    let a = model.add("a", &maven_dir(&temp, "a", &simple_pom("a")), &[]);
    let b = model.add("b", &maven_dir(&temp, "b", &simple_pom("b")), &[]);
    model.read_only.insert(a.clone());
    let model = Arc::new(model);
    let executor = Arc::new(DeferredExecutor::default());
    let (configurator, registry) = configurator(model.clone(), executor.clone());

    configurator.configure(&a);
    configurator.configure(&b);
    executor.run_all();

    assert!(model.natures(&a).is_empty());
    assert_eq!(model.natures(&b), vec![MAVEN_NATURE_ID.to_owned()]);
    // `a` is still updated: its nature may exist from an earlier run.
    assert!(registry.contains(&a));
    assert!(registry.contains(&b));
}

#[test]
fn broken_pom_fails_only_its_project() {
    let temp = TempDir::new().unwrap();
    let mut model = MemoryModel::default();
    let broken = model.add("broken", &maven_dir(&temp, "broken", "<project>"), &[]);
    let fine = model.add("fine", &maven_dir(&temp, "fine", &simple_pom("fine")), &[]);
    let model = Arc::new(model);
    let executor = Arc::new(DeferredExecutor::default());
    let (configurator, registry) = configurator(model, executor.clone());

    configurator.configure(&broken);
    configurator.configure(&fine);
    executor.run_all();

    assert!(!registry.contains(&broken));
    assert!(registry.contains(&fine));
    assert_eq!(configurator.worker().stats().failures, 1);
    assert_eq!(configurator.worker().pending_len(), 0);
}

#[test]
fn can_configure_requires_a_pom_at_the_project_root() {
    let temp = TempDir::new().unwrap();
    let plain = temp.path().join("plain");
    std::fs::create_dir_all(&plain).unwrap();
    let mut model = MemoryModel::default();
    let maven = model.add("maven", &maven_dir(&temp, "maven", &simple_pom("m")), &[]);
    let plain = model.add("plain", &plain, &[]);
    let (configurator, _registry) = configurator(Arc::new(model), Arc::new(InlineExecutor));

    assert!(configurator.can_configure(&maven));
    assert!(!configurator.can_configure(&plain));
    assert!(!configurator.can_configure(&ProjectRef::new("unknown")));
    assert!(configurator.should_be_project(&temp.path().join("maven")));
    assert!(!configurator.should_be_project(temp.path()));
    assert!(configurator.configuration_wizard().is_none());
}

#[test]
fn ignores_conventional_maven_directories() {
    let temp = TempDir::new().unwrap();
    let root = maven_dir(&temp, "app", &simple_pom("app"));
    let mut model = MemoryModel::default();
    let app = model.add("app", &root, &[]);
    let (configurator, _registry) = configurator(Arc::new(model), Arc::new(InlineExecutor));

    assert_eq!(
        configurator.directories_to_ignore(&app),
        BTreeSet::from([root.join("src"), root.join("target")])
    );
}

#[test]
fn update_reports_progress_per_project() {
    use easyport_maven::{UpdateMavenProjects, UPDATE_JOB_NAME};
    use easyport_scheduler::{BatchOperation, CancellationToken, ProgressEvent, ProgressSender};

    let temp = TempDir::new().unwrap();
    let mut model = MemoryModel::default();
    let a = model.add("a", &maven_dir(&temp, "a", &simple_pom("a")), &[]);
    let b = model.add("b", &maven_dir(&temp, "b", &simple_pom("b")), &[]);
    let registry = Arc::new(MavenProjectRegistry::new());
    let update = UpdateMavenProjects::new(Arc::new(model), registry.clone());

    let progress = ProgressSender::with_capacity(16);
    let mut events = progress.subscribe();
    let monitor = JobMonitor::new(CancellationToken::new(), progress);
    update
        .run_batch(&HashSet::from([a, b]), &monitor)
        .unwrap();

    match events.try_recv().unwrap() {
        ProgressEvent::Begin { title, total, .. } => {
            assert_eq!(title, UPDATE_JOB_NAME);
            assert_eq!(total, Some(2));
        }
        other => panic!("expected Begin, got {other:?}"),
    }
    let reports = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| matches!(event, ProgressEvent::Report { .. }))
        .count();
    assert_eq!(reports, 2);
    assert_eq!(registry.len(), 2);
}
