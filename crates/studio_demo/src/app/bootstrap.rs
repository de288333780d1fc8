use std::path::PathBuf;

use photo_studio::{resolve_studio_paths, StartupError, StudioPaths};
use tracing::info;
use tracing_subscriber::EnvFilter;

const JOB_SCRIPT_ENV_VAR: &str = "PHOTO_STUDIO_JOB_SCRIPT";

pub(crate) struct DemoWiring {
    pub(crate) paths: StudioPaths,
    pub(crate) script_path: PathBuf,
    pub(crate) output_dir: PathBuf,
}

pub(crate) fn build_demo() -> Result<DemoWiring, StartupError> {
    init_tracing();
    info!("=== Photo Studio Demo ===");

    let paths = resolve_studio_paths()?;
    let script_path = job_script_override(std::env::var(JOB_SCRIPT_ENV_VAR).ok().as_deref())
        .unwrap_or_else(|| default_job_script(&paths));
    let output_dir = paths.cache_dir.join("photos");
    info!(
        root = %paths.root.display(),
        script = %script_path.display(),
        output = %output_dir.display(),
        "studio_demo_paths_resolved"
    );

    Ok(DemoWiring {
        paths,
        script_path,
        output_dir,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn default_job_script(paths: &StudioPaths) -> PathBuf {
    paths.root.join("demo").join("jobs.json")
}

fn job_script_override(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
