use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tempfile::{TempDir, tempdir};
use updater_core::{
    ElevationError, HelperExit, HelperRequest, InstallError, InstallObserver, InstallerConfig,
    OperationError, Phase, ProcessControl, ScriptParseError, UpdateInstaller, UpdateScript,
    WaitOutcome, privileges,
};

/// Real waits and privilege probes; relaunching is never expected.
struct LocalProcesses;

impl ProcessControl for LocalProcesses {
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> WaitOutcome {
        updater_platform::process::wait_for_exit(pid, timeout)
    }

    fn has_sufficient_privileges(&self, install_dir: &Path, script: &UpdateScript) -> bool {
        privileges::can_write_all(install_dir, script)
    }

    fn relaunch_elevated(&self, _request: &HelperRequest) -> Result<HelperExit, ElevationError> {
        Err(ElevationError::Launch("not expected in tests".to_string()))
    }
}

#[derive(Default)]
struct FinishedCounter {
    finished: Mutex<Vec<Result<(), InstallError>>>,
}

impl InstallObserver for FinishedCounter {
    fn finished(&self, result: &Result<(), InstallError>) {
        self.finished.lock().expect("lock").push(result.clone());
    }
}

struct Layout {
    _temp: TempDir,
    install: PathBuf,
    package: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let temp = tempdir().expect("create temp dir");
        let install = temp.path().join("install");
        let package = temp.path().join("package");
        std::fs::create_dir_all(&install).expect("create install dir");
        std::fs::create_dir_all(&package).expect("create package dir");
        Self {
            _temp: temp,
            install,
            package,
        }
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        std::fs::write(path, contents).expect("write file");
    }

    fn manifest(&self, text: &str) -> Result<UpdateScript, ScriptParseError> {
        let path = self.package.join("update.script");
        std::fs::write(&path, text).expect("write manifest");
        UpdateScript::parse(&path)
    }

    fn run(&self, script: UpdateScript) -> (Result<(), InstallError>, FinishedCounter) {
        let observer = FinishedCounter::default();
        let mut installer = UpdateInstaller::new(
            InstallerConfig::new(&self.install, &self.package),
            Some(script),
            &LocalProcesses,
        );
        installer.set_observer(&observer);
        let result = installer.run();
        (result, observer)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        collect(&self.install, &self.install, &mut files);
        files
    }
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, String>) {
    for entry in std::fs::read_dir(dir).expect("read dir").flatten() {
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .expect("entry under root")
            .to_string_lossy()
            .replace('\\', "/");
        if path.is_dir() {
            files.insert(format!("{relative}/"), String::new());
            collect(root, &path, files);
        } else {
            files.insert(relative, std::fs::read_to_string(&path).expect("read file"));
        }
    }
}

#[test]
fn copy_and_delete_scenario_finishes_once_with_success() {
    let layout = Layout::new();
    Layout::write(&layout.package, "app/bin/app.exe", "new app");
    Layout::write(&layout.install, "app.exe", "old app");
    Layout::write(&layout.install, "app/old.dll", "stale");

    let script = layout
        .manifest("COPY app/bin/app.exe -> app.exe\nDELETE app/old.dll\n")
        .expect("manifest should parse");
    let (result, observer) = layout.run(script);

    assert_eq!(result, Ok(()));
    assert_eq!(
        std::fs::read_to_string(layout.install.join("app.exe")).expect("read app"),
        "new app"
    );
    assert!(!layout.install.join("app/old.dll").exists());
    assert_eq!(*observer.finished.lock().expect("lock"), vec![Ok(())]);
}

#[test]
fn rerunning_a_script_reaches_the_same_state() {
    let layout = Layout::new();
    Layout::write(&layout.package, "bin/tool", "v2");
    Layout::write(&layout.package, "share/readme.txt", "docs");
    Layout::write(&layout.install, "bin/tool", "v1");
    Layout::write(&layout.install, "lib/legacy.so", "old");
    let text = "COPY bin/tool -> bin/tool\n\
                COPY share/readme.txt -> share/doc/readme.txt\n\
                DELETE lib/legacy.so\n";

    let (first, _) = layout.run(layout.manifest(text).expect("manifest should parse"));
    let after_first = layout.snapshot();
    let (second, _) = layout.run(layout.manifest(text).expect("manifest should parse"));

    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));
    assert_eq!(layout.snapshot(), after_first);
}

#[test]
fn fatal_failure_leaves_earlier_steps_applied_and_later_ones_untouched() {
    let layout = Layout::new();
    Layout::write(&layout.package, "one.txt", "1");
    Layout::write(&layout.package, "three.txt", "3");
    Layout::write(&layout.install, "keep.txt", "still here");

    let script = layout
        .manifest("COPY one.txt -> one.txt\nCOPY two.txt -> two.txt\nDELETE keep.txt\nCOPY three.txt -> three.txt\n")
        .expect("manifest should parse");
    let (result, observer) = layout.run(script);

    assert!(matches!(
        result,
        Err(InstallError::Operation {
            index: 2,
            source: OperationError::SourceMissing { .. },
            ..
        })
    ));
    assert!(layout.install.join("one.txt").is_file());
    assert!(layout.install.join("keep.txt").is_file());
    assert!(!layout.install.join("three.txt").exists());
    assert_eq!(observer.finished.lock().expect("lock").len(), 1);
}

#[test]
fn unknown_operation_is_rejected_before_any_installer_exists() {
    let layout = Layout::new();

    let error = layout
        .manifest("FROB x y\n")
        .expect_err("unknown kind should fail");

    assert!(matches!(error, ScriptParseError::UnknownOperation { line: 1, ref kind } if kind == "FROB"));
}

#[test]
fn traversal_is_rejected_at_parse_time() {
    let layout = Layout::new();
    Layout::write(&layout.package, "payload", "x");

    let error = layout
        .manifest("COPY payload -> ../escaped\n")
        .expect_err("escaping destination should fail");

    assert!(matches!(error, ScriptParseError::InvalidPath { .. }));
    assert!(!layout.install.parent().expect("parent").join("escaped").exists());
}

#[test]
fn waiting_on_a_missing_pid_does_not_block() {
    let layout = Layout::new();
    let mut config = InstallerConfig::new(&layout.install, &layout.package);
    config.wait_pid = Some(u32::MAX - 1);
    config.wait_timeout = Duration::from_secs(60);

    let started = Instant::now();
    let mut installer = UpdateInstaller::new(config, None, &LocalProcesses);
    installer.run().expect("run should succeed");

    assert_eq!(installer.phase(), Phase::Finished);
    assert!(started.elapsed() < Duration::from_secs(10));
}
