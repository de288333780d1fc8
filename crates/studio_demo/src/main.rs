mod app;

use tracing::error;

fn main() {
    if let Err(err) = app::run() {
        error!(error = %err, "studio_demo_failed");
        std::process::exit(1);
    }
}
