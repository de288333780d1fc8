use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use photo_studio::{
    photo_cache_dir, write_bytes_atomic, DirectoryStore, ImageTask, JsonSceneLoader, PhotoStudio,
    SimulationKind, SoftwareViewport, StartupError, StoreError, StudioPaths, StudioServices,
    WorldSimulationRegistry,
};
use thiserror::Error;
use tracing::{info, warn};

use super::bootstrap;
use super::colony_sim::ColonySimulation;
use super::job_script::{load_job_script, JobScript, JobScriptError};
use super::subjects::build_subject;

const TICK_DELTA_SECONDS: f32 = 1.0 / 60.0;
const MAX_TICKS: u32 = 100_000;

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    JobScript(#[from] JobScriptError),
    #[error("failed to open photo cache: {0}")]
    Store(#[from] StoreError),
    #[error("studio did not finish its queue within {max_ticks} ticks")]
    Stalled { max_ticks: u32 },
    #[error("failed to encode photo {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write photo {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create output directory {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{failed} of {total} photo jobs failed")]
    JobsFailed { failed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemoReport {
    pub(crate) ticks: u32,
    pub(crate) written: Vec<PathBuf>,
}

pub(crate) fn run() -> Result<(), DemoError> {
    let wiring = bootstrap::build_demo()?;
    let script = load_job_script(&wiring.script_path)?;
    let report = run_script(&wiring.paths, &script, &wiring.output_dir)?;
    info!(
        ticks = report.ticks,
        written = report.written.len(),
        "studio_demo_finished"
    );
    Ok(())
}

/// Queues every job in `script`, drives the studio until the queue drains and
/// writes each photo to `output_dir/<job name>.png`.
pub(crate) fn run_script(
    paths: &StudioPaths,
    script: &JobScript,
    output_dir: &Path,
) -> Result<DemoReport, DemoError> {
    let mut studio = build_studio(paths, script)?;
    let fov_degrees = studio.config().camera_fov_degrees;
    let tasks = script
        .jobs
        .iter()
        .map(|job| {
            let subject = build_subject(&job.subject, fov_degrees);
            (job.name.as_str(), studio.request_image(subject, job.priority))
        })
        .collect::<Vec<_>>();

    let ticks = studio
        .run_until_idle(TICK_DELTA_SECONDS, MAX_TICKS)
        .ok_or(DemoError::Stalled {
            max_ticks: MAX_TICKS,
        })?;
    info!(ticks, jobs = tasks.len(), "studio_demo_queue_drained");

    fs::create_dir_all(output_dir).map_err(|source| DemoError::CreateOutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::new();
    let mut failed = 0;
    for (name, task) in &tasks {
        match write_photo(output_dir, name, task)? {
            Some(path) => written.push(path),
            None => failed += 1,
        }
    }
    studio.shutdown();

    if failed > 0 {
        return Err(DemoError::JobsFailed {
            failed,
            total: tasks.len(),
        });
    }
    Ok(DemoReport { ticks, written })
}

fn build_studio(paths: &StudioPaths, script: &JobScript) -> Result<PhotoStudio, DemoError> {
    let config = script.studio.clone().with_env_overrides();
    let store = DirectoryStore::open(photo_cache_dir(&paths.cache_dir))?;

    let mut simulations = WorldSimulationRegistry::new();
    simulations.register(SimulationKind::ColonyGraphics, || {
        Box::new(ColonySimulation::new())
    });

    let viewport = SoftwareViewport::new(script.viewport.width, script.viewport.height)
        .with_clear_color(script.viewport.background);
    Ok(PhotoStudio::new(
        config,
        StudioServices {
            loader: Arc::new(JsonSceneLoader::new(&paths.scenes_dir)),
            viewport: Box::new(viewport),
            simulations,
            durable_store: Some(Box::new(store)),
        },
    ))
}

/// Returns `None` when the job failed; the failure has already been logged.
fn write_photo(output_dir: &Path, name: &str, task: &ImageTask) -> Result<Option<PathBuf>, DemoError> {
    let artifact = match task.outcome() {
        Some(Ok(artifact)) => artifact,
        Some(Err(error)) => {
            warn!(job = name, error = %error, "studio_demo_job_failed");
            return Ok(None);
        }
        None => {
            warn!(job = name, "studio_demo_job_unfinished");
            return Ok(None);
        }
    };

    let path = output_dir.join(format!("{name}.png"));
    let mut encoded = Cursor::new(Vec::new());
    artifact
        .image()
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|source| DemoError::Encode {
            path: path.clone(),
            source,
        })?;
    write_bytes_atomic(&path, encoded.get_ref()).map_err(|source| DemoError::WriteOutput {
        path: path.clone(),
        source,
    })?;
    let (width, height) = artifact.dimensions();
    info!(job = name, path = %path.display(), width, height, "studio_demo_photo_written");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::app::job_script::parse_job_script;

    const CUBE_SCENE: &str = r#"{
        "name": "cube_root",
        "children": [ { "name": "cube", "shape": { "radius": 1.0, "color": [255, 255, 255, 255] } } ]
    }"#;

    fn temp_paths(temp: &TempDir) -> StudioPaths {
        let scenes_dir = temp.path().join("assets").join("scenes");
        fs::create_dir_all(scenes_dir.join("demo")).expect("scenes dir");
        fs::write(scenes_dir.join("demo").join("cube.json"), CUBE_SCENE).expect("scene");
        let cache_dir = temp.path().join("cache");
        fs::create_dir_all(&cache_dir).expect("cache dir");
        StudioPaths {
            root: temp.path().to_path_buf(),
            scenes_dir,
            cache_dir,
        }
    }

    fn script(raw: &str) -> JobScript {
        parse_job_script(Path::new("jobs.json"), raw).expect("script")
    }

    #[test]
    fn writes_one_png_per_job() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        let output = temp.path().join("out");
        let script = script(
            r#"{
                "studio": { "stabilization_tick_limit": 2000 },
                "viewport": { "width": 24, "height": 16 },
                "jobs": [
                    { "name": "red_cube", "subject": { "kind": "scene", "scene": "res://demo/cube.json", "tint": [200, 0, 0, 255] } },
                    { "name": "colony", "priority": 0, "subject": { "kind": "colony", "cells": 6, "seed": 4, "color": [0, 180, 0, 255] } }
                ]
            }"#,
        );

        let report = run_script(&paths, &script, &output).expect("run");
        assert_eq!(report.written.len(), 2);
        let cube = image::open(output.join("red_cube.png"))
            .expect("decode")
            .into_rgba8();
        assert_eq!(cube.dimensions(), (24, 16));
        assert_eq!(cube.get_pixel(12, 8).0, [200, 0, 0, 255]);
        assert!(output.join("colony.png").is_file());
    }

    #[test]
    fn reused_scene_does_not_keep_the_previous_tint() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        let output = temp.path().join("out");
        let script = script(
            r#"{
                "viewport": { "width": 16, "height": 16 },
                "jobs": [
                    { "name": "red", "priority": 0, "subject": { "kind": "scene", "scene": "res://demo/cube.json", "tint": [255, 0, 0, 255] } },
                    { "name": "plain", "priority": 1, "subject": { "kind": "scene", "scene": "res://demo/cube.json" } }
                ]
            }"#,
        );

        run_script(&paths, &script, &output).expect("run");
        let center = |name: &str| {
            image::open(output.join(format!("{name}.png")))
                .expect("decode")
                .into_rgba8()
                .get_pixel(8, 8)
                .0
        };
        assert_eq!(center("red"), [255, 0, 0, 255]);
        assert_eq!(center("plain"), [255, 255, 255, 255]);
    }

    #[test]
    fn missing_scene_reports_failed_jobs() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        let script = script(
            r#"{ "jobs": [
                { "name": "ok", "subject": { "kind": "scene", "scene": "res://demo/cube.json" } },
                { "name": "missing", "subject": { "kind": "scene", "scene": "res://demo/nope.json" } }
            ] }"#,
        );

        match run_script(&paths, &script, &temp.path().join("out")) {
            Err(DemoError::JobsFailed { failed, total }) => {
                assert_eq!((failed, total), (1, 2));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(temp.path().join("out").join("ok.png").is_file());
    }
}
