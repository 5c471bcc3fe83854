//! Entry point for the Brejax downloader window

use brejax::app::BrejaxApp;
use brejax::downloader::YtDlp;
use brejax::fsutil::ensure_dir;
use brejax::prefs::PreferenceStore;
use brejax::tools::ToolSet;
use brejax::{Controller, JobRunner};
use eframe::egui::{self, Visuals};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let runtime = Arc::new(Runtime::new().expect("failed to start the tokio runtime"));

    // One lookup of the external tools per run
    let tools = ToolSet::discover();
    let has_extractor = tools.extractor.is_some();

    let store = PreferenceStore::user();
    let prefs = store.load();

    let default_dir = dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    if !default_dir.exists() {
        ensure_dir(&default_dir);
    }

    let runner = JobRunner::new(
        Arc::new(YtDlp::new(tools.extractor)),
        tools.transcoder,
        runtime.handle().clone(),
    );
    let controller = Controller::new(runner, store, prefs, &default_dir);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([680.0, 560.0])
            .with_min_inner_size([480.0, 380.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Brejax Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(BrejaxApp::new(controller, runtime, has_extractor))
        }),
    )
}
