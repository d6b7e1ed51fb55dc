//! Native monitor window
//!
//! Shows the poller's status log, offers the 0-3 test slider used to check
//! MIDI routing while the game is closed, and hosts the settings and about
//! dialogs. The window never touches the MIDI port or the game process; it
//! only reads [`PollerEvent`]s and writes the shared [`TestValue`].

use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{FileConfigStore, MessageType, MidiConfig};
use crate::emitter::output_port_names;
use crate::events::{self, EventSink, EventStream, PollerEvent};
use crate::poller::{self, Phase};
use crate::test_value::{TestValue, MAX_TEST_VALUE};

const HELP_URL: &str = "https://github.com/bboylalu/RSTone2MIDI";

/// Trough tint of the disabled test slider ("indian red")
const ATTACHED_TINT: egui::Color32 = egui::Color32::from_rgb(205, 92, 92);

/// Settings dialog state
struct SettingsDraft {
    ports: Vec<String>,
    port_index: Option<usize>,
    message_type: MessageType,
    error: Option<String>,
}

impl SettingsDraft {
    fn load(current: Option<MidiConfig>) -> Self {
        let (ports, error) = match output_port_names() {
            Ok(ports) if ports.is_empty() => (ports, Some("No MIDI output ports found.".to_string())),
            Ok(ports) => (ports, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let port_index = current
            .map(|c| c.port_index)
            .filter(|&i| i < ports.len())
            .or(if ports.is_empty() { None } else { Some(0) });

        Self {
            ports,
            port_index,
            message_type: current
                .map(|c| c.message_type)
                .unwrap_or(MessageType::ProgramChange),
            error,
        }
    }
}

/// A missing, unreadable or out-of-range configuration sends the user to
/// the settings dialog at launch
fn needs_settings(current: Option<&MidiConfig>, ports: &[String]) -> bool {
    current.map_or(true, |config| config.port_index >= ports.len())
}

/// Main window
pub struct MonitorApp {
    store: FileConfigStore,
    test_value: TestValue,
    sink: EventSink,
    events: EventStream,
    poller: Option<JoinHandle<()>>,
    poller_running: bool,
    phase: Phase,
    slider: u8,
    log: Vec<String>,
    settings: Option<SettingsDraft>,
    show_about: bool,
}

impl MonitorApp {
    pub fn new(store: FileConfigStore, test_value: TestValue, sink: EventSink, events: EventStream) -> Self {
        let current = store.load().ok();
        let ports = output_port_names().unwrap_or_default();
        let settings = needs_settings(current.as_ref(), &ports).then(|| SettingsDraft::load(current));

        let mut app = Self {
            store,
            slider: test_value.get(),
            test_value,
            sink,
            events,
            poller: None,
            poller_running: false,
            phase: Phase::Idle,
            log: Vec::new(),
            settings,
            show_about: false,
        };
        app.start_poller();
        app
    }

    fn start_poller(&mut self) {
        match poller::spawn(
            self.store.path().to_path_buf(),
            self.test_value.clone(),
            self.sink.clone(),
        ) {
            Ok(handle) => {
                self.poller = Some(handle);
                self.poller_running = true;
            }
            Err(e) => {
                warn!("Failed to start poller thread: {}", e);
                self.log.push(format!("Could not start the tone poller: {}", e));
            }
        }
    }

    fn drain_events(&mut self) {
        for event in self.events.drain() {
            match event {
                PollerEvent::Status(status) => self.log.push(status.display_line()),
                PollerEvent::Phase(phase) => self.phase = phase,
                PollerEvent::Stopped => {
                    self.poller_running = false;
                    self.phase = Phase::Idle;
                    if let Some(handle) = self.poller.take() {
                        let _ = handle.join();
                    }
                }
            }
        }
    }

    fn open_settings(&mut self) {
        self.settings = Some(SettingsDraft::load(self.store.load().ok()));
    }

    fn save_settings(&mut self) {
        let Some(draft) = self.settings.as_mut() else {
            return;
        };
        let Some(port_index) = draft.port_index else {
            draft.error = Some("Missing port selection.".to_string());
            return;
        };

        let config = MidiConfig {
            port_index,
            message_type: draft.message_type,
        };
        if let Err(e) = self.store.save(&config) {
            draft.error = Some(e.to_string());
            return;
        }

        self.settings = None;
        if self.poller_running {
            self.log
                .push("Configuration saved. Restart RSTone2MIDI to apply it.".to_string());
        } else {
            info!("Restarting poller with the new configuration");
            self.start_poller();
        }
    }

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Settings").clicked() {
                        self.open_settings();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Help", |ui| {
                    ui.hyperlink_to("How to use", HELP_URL);
                    ui.separator();
                    if ui.button("About").clicked() {
                        self.show_about = true;
                        ui.close_menu();
                    }
                });
            });
        });
    }

    fn test_slider(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("test_slider").show(ctx, |ui| {
            ui.add_space(6.0);
            let attached = self.phase.is_attached();

            ui.horizontal(|ui| {
                let mut value = self.slider;
                let slider = egui::Slider::new(&mut value, 0..=MAX_TEST_VALUE).text("Test MIDI (0-3)");
                if attached {
                    ui.visuals_mut().widgets.inactive.bg_fill = ATTACHED_TINT;
                }
                if ui.add_enabled(!attached, slider).changed() {
                    self.slider = value;
                    self.test_value.set(value);
                }
                if attached {
                    ui.colored_label(ATTACHED_TINT, "Game running");
                } else if !self.poller_running {
                    ui.colored_label(ATTACHED_TINT, "Stopped - check Settings");
                }
            });
            ui.add_space(6.0);
        });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let Some(draft) = self.settings.as_mut() else {
            return;
        };

        let mut open = true;
        let mut save = false;
        egui::Window::new("MIDI Configuration")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                let selected = draft
                    .port_index
                    .and_then(|i| draft.ports.get(i).map(|name| format!("{}: {}", i, name)))
                    .unwrap_or_else(|| "-".to_string());

                egui::ComboBox::from_label("MIDI port")
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        for (index, name) in draft.ports.iter().enumerate() {
                            ui.selectable_value(&mut draft.port_index, Some(index), format!("{}: {}", index, name));
                        }
                    });

                egui::ComboBox::from_label("Message type")
                    .selected_text(draft.message_type.label())
                    .show_ui(ui, |ui| {
                        for message_type in MessageType::ALL {
                            ui.selectable_value(&mut draft.message_type, message_type, message_type.label());
                        }
                    });

                if let Some(error) = &draft.error {
                    ui.colored_label(egui::Color32::RED, error.as_str());
                }

                ui.add_space(8.0);
                if ui.button("Save Configuration").clicked() {
                    save = true;
                }
            });

        if save {
            self.save_settings();
        } else if !open {
            self.settings = None;
        }
    }

    fn about_window(&mut self, ctx: &egui::Context) {
        egui::Window::new("About RSTone2MIDI")
            .collapsible(false)
            .resizable(false)
            .open(&mut self.show_about)
            .show(ctx, |ui| {
                ui.label(format!("RSTone2MIDI v{}", env!("CARGO_PKG_VERSION")));
                ui.hyperlink(HELP_URL);
                ui.add_space(6.0);
                ui.label("Sends MIDI messages based on the current tone in Rocksmith 2014.");
                ui.label("Provided as is, without warranty of any kind.");
            });
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        self.menu_bar(ctx);
        self.test_slider(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.log {
                        ui.label(line.as_str());
                    }
                });
        });

        self.settings_window(ctx);
        self.about_window(ctx);

        // Keep draining the event channel while nothing else repaints
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

/// Open the monitor window; blocks until it is closed.
pub fn run(store: FileConfigStore, test_value: TestValue) -> anyhow::Result<()> {
    let (sink, events) = events::channel();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("RSTone2MIDI")
            .with_inner_size([640.0, 420.0])
            .with_min_inner_size([420.0, 260.0]),
        ..Default::default()
    };

    eframe::run_native(
        "RSTone2MIDI",
        native_options,
        Box::new(move |_cc| Ok(Box::new(MonitorApp::new(store, test_value, sink, events)))),
    )
    .map_err(|e| anyhow::anyhow!("monitor window failed: {}", e))
}
