use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use photo_studio::{validate_resource_path, StudioConfig, DEFAULT_PRIORITY};
use serde::Deserialize;
use thiserror::Error;

const MAX_VIEWPORT_SIDE: u32 = 4096;
const MAX_COLONY_CELLS: u32 = 512;

#[derive(Debug, Error)]
pub(crate) enum JobScriptError {
    #[error("failed to read job script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse job script {path} at {location}: {source}")]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid job script {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Batch of photo requests plus the studio settings to run them with.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct JobScript {
    #[serde(default)]
    pub(crate) studio: StudioConfig,
    #[serde(default)]
    pub(crate) viewport: ViewportSpec,
    pub(crate) jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ViewportSpec {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) background: [u8; 4],
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            background: [0, 0, 0, 0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct JobSpec {
    /// Output file stem.
    pub(crate) name: String,
    #[serde(default = "default_priority")]
    pub(crate) priority: i32,
    pub(crate) subject: SubjectSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum SubjectSpec {
    Scene {
        scene: String,
        #[serde(default)]
        tint: Option<[u8; 4]>,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    Colony {
        cells: u32,
        #[serde(default)]
        seed: u64,
        color: [u8; 4],
    },
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_scale() -> f32 {
    1.0
}

pub(crate) fn load_job_script(path: &Path) -> Result<JobScript, JobScriptError> {
    let raw = fs::read_to_string(path).map_err(|source| JobScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_job_script(path, &raw)
}

pub(crate) fn parse_job_script(path: &Path, raw: &str) -> Result<JobScript, JobScriptError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let script: JobScript =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let location = error.path().to_string();
            JobScriptError::Parse {
                path: path.to_path_buf(),
                location,
                source: error.into_inner(),
            }
        })?;
    validate(&script).map_err(|message| JobScriptError::Invalid {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(script)
}

fn validate(script: &JobScript) -> Result<(), String> {
    let viewport = script.viewport;
    if viewport.width == 0
        || viewport.height == 0
        || viewport.width > MAX_VIEWPORT_SIDE
        || viewport.height > MAX_VIEWPORT_SIDE
    {
        return Err(format!(
            "viewport {}x{} must be between 1 and {MAX_VIEWPORT_SIDE} pixels per side",
            viewport.width, viewport.height
        ));
    }
    if script.jobs.is_empty() {
        return Err("job list is empty".to_string());
    }

    let mut seen = HashSet::new();
    for (index, job) in script.jobs.iter().enumerate() {
        if !is_valid_job_name(&job.name) {
            return Err(format!(
                "jobs[{index}].name {:?} may only contain ASCII letters, digits, '_' and '-'",
                job.name
            ));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(format!("jobs[{index}].name {:?} is used twice", job.name));
        }
        validate_subject(&job.subject).map_err(|message| format!("jobs[{index}].subject: {message}"))?;
    }
    Ok(())
}

fn validate_subject(subject: &SubjectSpec) -> Result<(), String> {
    match subject {
        SubjectSpec::Scene { scene, scale, .. } => {
            validate_resource_path(scene).map_err(|error| error.to_string())?;
            if !scale.is_finite() || *scale <= 0.0 {
                return Err(format!("scale {scale} must be positive"));
            }
        }
        SubjectSpec::Colony { cells, .. } => {
            if *cells == 0 || *cells > MAX_COLONY_CELLS {
                return Err(format!(
                    "cells {cells} must be between 1 and {MAX_COLONY_CELLS}"
                ));
            }
        }
    }
    Ok(())
}

fn is_valid_job_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
