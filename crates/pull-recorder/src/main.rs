//! Pull Recorder: records boss pulls automatically, with tray and hotkey
//! control and a local web UI for playback.

mod app;
mod app_command;
mod clipboard;
mod config;
mod desktop;
mod error;
mod hotkey_handler;
mod logging;
mod notifier;
mod server;
mod tray_command;
mod tray_icon_state;
mod tray_manager;

pub(crate) use {
    app::App,
    app_command::AppCommand,
    error::{AppError, Result as AppResult},
    hotkey_handler::{HotkeyBindings, HotkeyHandler},
    tray_command::TrayCommand,
    tray_icon_state::TrayIconState,
    tray_manager::{TrayManager, TrayMenuIds},
};

use crate::{
    config::Config,
    desktop::{CommandInferenceEngine, Ffmpeg, FfmpegCaptureProvider, FfmpegEncoderFactory},
    server::ServerState,
};

use pull_recorder_core::{
    CaptureController, ControllerDeps, inference::InferenceEngine, persistence::FsRecordingStore,
};

use std::{path::PathBuf, sync::Arc};

use global_hotkey::GlobalHotKeyManager;
use tao::{
    event::Event,
    event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy},
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument, warn};

/// Everything the runtime thread needs from the main thread.
struct RuntimeParts {
    config: Config,
    recordings_dir: PathBuf,
    bindings: HotkeyBindings,
    menu_ids: TrayMenuIds,
    tray_proxy: EventLoopProxy<TrayCommand>,
}

/// Application entry point.
fn main() {
    let log_dir = Config::data_dir().ok().map(|dir| dir.join("logs"));
    let _log_guard = logging::init(log_dir.as_deref());

    let event_loop = EventLoopBuilder::<TrayCommand>::with_user_event().build();
    let tray_proxy = event_loop.create_proxy();

    // TrayManager lives on the main thread - TrayIcon is !Send on all platforms.
    let mut tray_manager = match TrayManager::new() {
        Ok(tm) => tm,
        Err(e) => {
            error!("Failed to create TrayManager: {:?}", e);
            std::process::exit(1);
        }
    };

    // Persists across event loop iterations; dropping it unregisters the hotkeys.
    let mut hotkey_manager: Option<GlobalHotKeyManager> = None;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::UserEvent(cmd) => {
                match cmd {
                    TrayCommand::SetState(state) => {
                        if let Err(e) = tray_manager.update_state(state) {
                            error!(error = ?e, "Failed to update tray icon");
                        }
                    }
                    TrayCommand::SetProgress { name, bytes } => {
                        if let Err(e) = tray_manager.update_progress(&name, bytes) {
                            error!(error = ?e, "Failed to update tray tooltip");
                        }
                    }
                    TrayCommand::Shutdown => {
                        *control_flow = ControlFlow::ExitWithCode(0);
                    }
                }
                return;
            }
            Event::NewEvents(tao::event::StartCause::Init) => {
                let config = match Config::load() {
                    Ok(c) => c,
                    Err(e) => {
                        error!("Failed to load config: {:?}", e);
                        std::process::exit(1);
                    }
                };

                let recordings_dir = match config.recordings_dir() {
                    Ok(dir) => dir,
                    Err(e) => {
                        error!("Failed to resolve recordings directory: {:?}", e);
                        std::process::exit(1);
                    }
                };

                #[cfg(target_os = "macos")]
                unsafe {
                    use core_foundation::runloop::{CFRunLoopGetMain, CFRunLoopWakeUp};
                    CFRunLoopWakeUp(CFRunLoopGetMain());
                }

                // Register hotkeys on the main thread; tao's event loop pumps
                // the Windows messages needed for WM_HOTKEY delivery.
                let (manager, bindings) = match HotkeyHandler::register_hotkeys() {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("Failed to register hotkeys: {:?}", e);
                        std::process::exit(1);
                    }
                };
                hotkey_manager = Some(manager);

                let parts = RuntimeParts {
                    config,
                    recordings_dir,
                    bindings,
                    menu_ids: tray_manager.menu_ids().clone(),
                    tray_proxy: tray_proxy.clone(),
                };

                // Spawn tokio runtime on separate thread.
                // TrayManager and hotkey_manager stay on the main thread.
                std::thread::spawn(move || {
                    let rt = match tokio::runtime::Runtime::new() {
                        Ok(rt) => rt,
                        Err(e) => {
                            error!("Failed to create tokio runtime: {:?}", e);
                            std::process::exit(1);
                        }
                    };

                    rt.block_on(run(parts));
                });
            }
            _ => {}
        }

        // Keep hotkey_manager alive in the closure for the app's lifetime.
        let _ = &hotkey_manager;
    });
}

/// Build the capture pipeline and run the app, hotkeys and web server
/// until shutdown.
#[instrument(skip_all)]
async fn run(parts: RuntimeParts) {
    let RuntimeParts {
        config,
        recordings_dir,
        bindings,
        menu_ids,
        tray_proxy,
    } = parts;

    let ffmpeg = Ffmpeg::locate(config.capture.ffmpeg_path.as_deref());
    let encoders = FfmpegEncoderFactory::probe(ffmpeg.clone()).await;
    let provider = FfmpegCaptureProvider::new(ffmpeg, config.capture.capture_fps);
    let store = Arc::new(FsRecordingStore::new(recordings_dir.clone()));

    let engine: Option<Arc<dyn InferenceEngine>> = match &config.detection.detector_command {
        Some(command) if config.detection_active() => {
            Some(Arc::new(CommandInferenceEngine::new(command.clone())))
        }
        _ => {
            warn!("Automatic detection disabled, manual recording only");
            None
        }
    };

    let deps = ControllerDeps {
        provider: Arc::new(provider),
        encoders: Arc::new(encoders),
        persistence: store.clone(),
        engine,
    };
    let (controller, controller_task) = CaptureController::spawn(deps, config.controller_config());

    let (command_tx, command_rx) = mpsc::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let hotkey_handler = HotkeyHandler::new(bindings, command_tx.clone());
    let server_state = ServerState {
        controller: controller.clone(),
        store,
    };

    let app = App {
        controller,
        controller_task,
        tray_proxy,
        command_tx,
        command_rx,
        shutdown_tx,
        menu_ids,
        recordings_dir,
        server_url: config.server_url(),
    };

    info!(url = %config.server_url(), "Starting services");

    tokio::join!(
        async {
            if let Err(e) = hotkey_handler.run(shutdown_rx.clone()).await {
                error!(error = ?e, "Hotkey handler error");
            }
        },
        async {
            if let Err(e) = server::serve(config.server.port, server_state, shutdown_rx.clone()).await {
                error!(error = ?e, "Web server error");
            }
        },
        async {
            if let Err(e) = app.run().await {
                error!(error = ?e, "App error");
            }
        }
    );
}
