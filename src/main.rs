#![cfg_attr(windows, windows_subsystem = "windows")]

mod algorithms;
mod app;
mod config;
mod crypto;
mod logger;
mod model;
mod selection;
mod session;
mod ssh;

fn main() -> eframe::Result<()> {
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = native_options
        .viewport
        .with_inner_size([960.0, 680.0])
        .with_min_inner_size([640.0, 420.0]);
    eframe::run_native(
        concat!("Rusty Profiles - v", env!("CARGO_PKG_VERSION")),
        native_options,
        Box::new(|_cc| Ok(Box::new(app::EditorApp::new()))),
    )
}
