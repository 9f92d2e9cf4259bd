//! Integration tests for the setup Pipeline
//!
//! These tests drive complete runs against a temporary directory tree:
//! - Mods disabled: archive extracted, world merged, mod step skipped (50 → 70),
//!   missing updater executable is fatal
//! - Full runs with stand-in executables reaching `Done`
//! - Reentrancy: a second start while a run is active is rejected

use camino::{Utf8Path, Utf8PathBuf};
use dstsetup::models::LogLevel;
use dstsetup::{
    InstallLayout, Pipeline, PipelineConfig, PipelineError, PipelineOptions, PipelineStage,
    StateManager, StepResult,
};
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;

const TOKEN: &str = "pds-g^KU_abc123^def456=";

struct Fixture {
    _temp: TempDir,
    root: Utf8PathBuf,
    layout: InstallLayout,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let layout = InstallLayout::new(root.join("Documents/Klei/DoNotStarveTogether"));

        write_archive(
            &root.join("MyDediServer.zip"),
            &[
                ("MyDediServer/cluster_token.txt", TOKEN),
                ("MyDediServer/cluster.ini", "[NETWORK]\ncluster_name = Test\n"),
                ("MyDediServer/Master/server.ini", "[SHARD]\nis_master = true\n"),
            ],
        );

        let world = root.join("Cluster_1");
        fs::create_dir_all(world.join("Master/save")).unwrap();
        fs::write(world.join("cluster.ini"), "[GAMEPLAY]\ngame_mode = endless\n").unwrap();
        fs::write(world.join("Master/save/session"), "world data").unwrap();

        fs::create_dir_all(root.join("steamcmd")).unwrap();

        Self {
            _temp: temp,
            root,
            layout,
        }
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            archive_path: self.root.join("MyDediServer.zip"),
            updater_install_path: self.root.join("steamcmd"),
            content_library_path: None,
            world_folder_path: self.root.join("Cluster_1"),
            mods_enabled: false,
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.layout.clone(),
            PipelineOptions::default(),
            StateManager::new(),
        )
    }

    fn server_dir(&self) -> Utf8PathBuf {
        self.layout.server_dir()
    }

    /// Symlink stand-ins for SteamCMD and the server binary.
    #[cfg(unix)]
    fn install_stand_ins(&self, updater_target: &str) {
        let steamcmd = self.root.join("steamcmd");
        std::os::unix::fs::symlink(updater_target, self.layout.updater_executable(&steamcmd))
            .unwrap();

        let server = self.layout.server_executable(&steamcmd);
        fs::create_dir_all(server.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("/bin/true", &server).unwrap();
    }
}

fn write_archive(path: &Utf8Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn drain(rx: &mut mpsc::UnboundedReceiver<StepResult>) -> Vec<StepResult> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn progress_sequence(entries: &[StepResult]) -> Vec<u8> {
    let mut sequence: Vec<u8> = Vec::new();
    for entry in entries {
        if sequence.last() != Some(&entry.progress_percent) {
            sequence.push(entry.progress_percent);
        }
    }
    sequence
}

#[tokio::test]
async fn test_mods_disabled_missing_updater_is_fatal() {
    let fx = Fixture::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = fx.pipeline().run(fx.config(), tx).await.unwrap();
    let entries = drain(&mut rx);

    assert_eq!(report.final_stage, PipelineStage::Failed);
    assert!(report.error.as_deref().unwrap().contains("Updater executable"));

    // Progress jumps from 50 straight to 70 and stops there
    assert_eq!(progress_sequence(&entries), vec![0, 10, 20, 35, 50, 70]);
    assert_eq!(report.progress, 70);
    assert!(report.mirror.is_none());
    assert!(!report.step_durations.contains_key(&PipelineStage::MirroringMods));
    assert!(entries
        .iter()
        .any(|e| e.step == PipelineStage::MirroringMods && e.message.contains("skipping")));

    // Exactly one terminal error, and it is the last entry
    let errors: Vec<&StepResult> = entries.iter().filter(|e| e.status == LogLevel::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, PipelineStage::Updating);
    assert_eq!(entries.last().unwrap().status, LogLevel::Error);

    // Extracted token survived the reconcile, the world was merged on top
    let server = fx.server_dir();
    assert_eq!(fs::read_to_string(server.join("cluster_token.txt")).unwrap(), TOKEN);
    assert!(!server.join("cluster_token.txt.bak").exists());
    assert!(server.join("cluster.ini").is_file());
    assert!(fs::read_to_string(server.join("cluster.ini"))
        .unwrap()
        .contains("endless"));
    assert!(server.join("Master/save/session").is_file());
    // Only came from the archive, swept by the reconcile
    assert!(!server.join("Master/server.ini").exists());

    assert_eq!(report.extracted_files, Some(3));
    assert!(report.reconcile.unwrap().preserved);
    assert_eq!(report.world_copy.unwrap().files, 2);
}

#[tokio::test]
async fn test_missing_archive_fails_before_any_io() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.archive_path = fx.root.join("missing.zip");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = fx.pipeline().run(config, tx).await.unwrap();
    let entries = drain(&mut rx);

    assert_eq!(report.final_stage, PipelineStage::Failed);
    assert_eq!(report.progress, 0);
    assert!(!fx.layout.data_root.exists());
    assert_eq!(
        entries.iter().filter(|e| e.status == LogLevel::Error).count(),
        1
    );
}

#[tokio::test]
async fn test_world_folder_must_follow_convention() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root.join("MyWorld")).unwrap();
    let mut config = fx.config();
    config.world_folder_path = fx.root.join("MyWorld");
    let (tx, _rx) = mpsc::unbounded_channel();

    let report = fx.pipeline().run(config, tx).await.unwrap();

    assert_eq!(report.final_stage, PipelineStage::Failed);
    assert!(report.error.unwrap().contains("cluster_"));
    assert!(!fx.server_dir().exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_run_with_mods_reaches_done() {
    let fx = Fixture::new();
    fx.install_stand_ins("/bin/true");

    let steam = fx.root.join("Steam");
    let workshop = fx.layout.workshop_source(&steam);
    fs::create_dir_all(workshop.join("378160973")).unwrap();
    fs::write(workshop.join("378160973/modinfo.lua"), "name = 'Global Positions'").unwrap();
    let local = fx.layout.local_mods_source(&steam);
    fs::create_dir_all(local.join("my-mod")).unwrap();
    fs::write(local.join("my-mod/modmain.lua"), "-- local").unwrap();

    let mut config = fx.config();
    config.mods_enabled = true;
    config.content_library_path = Some(steam);

    let pipeline = fx.pipeline();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = pipeline.run(config, tx).await.unwrap();
    let entries = drain(&mut rx);

    assert!(report.succeeded(), "run failed: {:?}", report.error);
    assert_eq!(report.progress, 100);
    assert_eq!(
        progress_sequence(&entries),
        vec![0, 10, 20, 35, 50, 70, 85, 100]
    );
    assert_eq!(entries.last().unwrap().status, LogLevel::Success);
    assert!(entries.iter().all(|e| e.status != LogLevel::Error));

    let mirror = report.mirror.as_ref().unwrap();
    assert_eq!(mirror.workshop_copied, 1);
    assert_eq!(mirror.local_copied, 1);
    let mods = fx.layout.mods_destination(&fx.root.join("steamcmd"));
    assert!(mods.join("workshop-378160973/modinfo.lua").is_file());
    assert!(mods.join("my-mod/modmain.lua").is_file());

    let shards: Vec<String> = report.servers.iter().map(|s| s.shard.to_string()).collect();
    assert_eq!(shards, vec!["Master", "Caves"]);
    assert!(report.servers[1].command_line.ends_with("-cluster MyDediServer -shard Caves"));

    let stages: Vec<PipelineStage> = report.step_durations.keys().copied().collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::ValidatingInputs,
            PipelineStage::Extracting,
            PipelineStage::Reconciling,
            PipelineStage::CopyingWorld,
            PipelineStage::MirroringMods,
            PipelineStage::Updating,
            PipelineStage::Launching,
        ]
    );

    let state = pipeline.state().snapshot();
    assert!(!state.is_running);
    assert_eq!(state.last_outcome, Some(PipelineStage::Done));
}

#[cfg(unix)]
#[tokio::test]
async fn test_updater_exit_code_is_a_warning() {
    let fx = Fixture::new();
    fx.install_stand_ins("/bin/false");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = fx.pipeline().run(fx.config(), tx).await.unwrap();
    let entries = drain(&mut rx);

    assert!(report.succeeded(), "run failed: {:?}", report.error);
    assert_eq!(report.warnings, 1);
    let warning = entries
        .iter()
        .find(|e| e.status == LogLevel::Warning)
        .unwrap();
    assert_eq!(warning.step, PipelineStage::Updating);
    assert!(warning.message.contains("exited with code 1"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_workshop_content_is_tolerated() {
    let fx = Fixture::new();
    fx.install_stand_ins("/bin/true");
    let steam = fx.root.join("Steam");
    fs::create_dir_all(&steam).unwrap();

    let mut config = fx.config();
    config.mods_enabled = true;
    config.content_library_path = Some(steam);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = fx.pipeline().run(config, tx).await.unwrap();
    let entries = drain(&mut rx);

    assert!(report.succeeded());
    assert!(report.mirror.unwrap().source_missing);
    assert!(entries
        .iter()
        .any(|e| e.status == LogLevel::Warning && e.step == PipelineStage::MirroringMods));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_start_rejected_while_running() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline();
    let handle = tokio::runtime::Handle::current();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = pipeline.start(fx.config(), tx, &handle).unwrap();

    // The slot is claimed before `start` returns
    let (tx2, _rx2) = mpsc::unbounded_channel();
    let second = pipeline.clone().start(fx.config(), tx2, &handle);
    assert_eq!(second.unwrap_err(), PipelineError::AlreadyRunning);

    // Sender is dropped when the run ends
    while rx.recv().await.is_some() {}
    let report = first.await.unwrap();
    assert_eq!(report.final_stage, PipelineStage::Failed);

    // Start is available again
    let (tx3, _rx3) = mpsc::unbounded_channel();
    let third = pipeline.start(fx.config(), tx3, &handle).unwrap();
    third.await.unwrap();
    assert_eq!(pipeline.state().read(|s| s.runs_completed), 2);
}
