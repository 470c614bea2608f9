/*!
GUI implementation for the tracker application.

Stands in for a host's parameter panel: port selection, device identity,
pose offsets, lens calibration commands and a live readout of every channel.
The GUI is the sampler here; it reads the shared state on every repaint.
*/

use crate::capture::{list_ports, open_source, SourceSpec};
use crate::config::{AppConfig, TransportConfig, TransportKind};
use eframe::egui;
use std::path::PathBuf;
use tracing::{error, info};
use tracker_core::{
    CalibrationMode, Command, DecodeLoop, Decoder, LinkStatus, TelemetryState,
};

/// Main GUI application state
pub struct TrackerGui {
    config: AppConfig,
    config_path: PathBuf,

    state: TelemetryState,
    session: Option<DecodeLoop>,
    // Kept between sessions so calibration survives a restart
    parked_decoder: Option<Decoder>,
    // UDP endpoint the running session is bound to
    bound_endpoint: Option<String>,

    // UI state
    ports: Vec<String>,
    simulate: bool,
    status_message: String,
}

impl TrackerGui {
    /// Create a new GUI instance
    pub fn new(config: AppConfig, config_path: PathBuf, cc: &eframe::CreationContext<'_>) -> Self {
        if config.gui.dark_mode {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
        } else {
            cc.egui_ctx.set_visuals(egui::Visuals::light());
        }

        Self {
            state: TelemetryState::new(config.tracker.device_id, config.tracker.offsets),
            config,
            config_path,
            session: None,
            parked_decoder: None,
            bound_endpoint: None,
            ports: list_ports(),
            simulate: false,
            status_message: "Ready".to_string(),
        }
    }

    fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Open the selected source and start decoding
    fn start_session(&mut self) {
        if self.is_running() {
            return;
        }

        let spec = if self.simulate { SourceSpec::Synthetic } else { SourceSpec::Configured };
        let source = match open_source(&spec, &self.config) {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open source: {:#}", e);
                self.status_message = format!("Failed to open source: {:#}", e);
                return;
            }
        };

        let decoder = match self.parked_decoder.take() {
            Some(decoder) => decoder,
            None => Decoder::new(&self.config.tracker, self.state.clone()),
        };

        match DecodeLoop::start(source, decoder) {
            Ok(session) => {
                self.status_message = format!("Reading from {}", session.source_name());
                self.bound_endpoint = match (&spec, self.config.transport.kind) {
                    (SourceSpec::Configured, TransportKind::Udp) => Some(udp_endpoint(&self.config.transport)),
                    _ => None,
                };
                self.session = Some(session);
            }
            Err(e) => {
                self.status_message = format!("Failed to start decode loop: {}", e);
            }
        }
    }

    /// Stop decoding, keeping the decoder for the next session
    fn stop_session(&mut self) {
        self.bound_endpoint = None;
        if let Some(session) = self.session.take() {
            match session.stop() {
                Ok(decoder) => {
                    self.parked_decoder = Some(decoder);
                    self.status_message = "Stopped".to_string();
                }
                Err(e) => {
                    self.status_message = format!("Decode loop failed: {}", e);
                }
            }
        }
    }

    fn restart_session(&mut self) {
        self.stop_session();
        self.start_session();
    }

    /// Push edited settings into the shared state
    fn sync_settings(&mut self) {
        let offsets = self.config.tracker.offsets;
        if self.state.offsets() != offsets {
            self.state.set_offsets(offsets);
        }
        if self.state.device_id() != self.config.tracker.device_id {
            self.state.set_device_id(self.config.tracker.device_id);
        }
    }

    fn axes_row(ui: &mut egui::Ui, label: &str, axes: &mut tracker_core::Axes, speed: f64) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(&mut axes.x).speed(speed).prefix("x "));
            ui.add(egui::DragValue::new(&mut axes.y).speed(speed).prefix("y "));
            ui.add(egui::DragValue::new(&mut axes.z).speed(speed).prefix("z "));
        });
    }
}

fn udp_endpoint(transport: &TransportConfig) -> String {
    format!("{}:{}", transport.udp_bind_addr.trim(), transport.udp_port)
}

/// Whether a running UDP session must rebind to `current`
fn endpoint_changed(bound: Option<&str>, current: &str, editing: bool) -> bool {
    !editing && bound.is_some_and(|bound| bound != current)
}

impl eframe::App for TrackerGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Source ended or failed on its own
        if self.session.as_ref().is_some_and(|s| s.is_finished()) {
            self.stop_session();
            self.status_message = match self.state.link_status() {
                LinkStatus::Failed(reason) => format!("Transport failed: {}", reason),
                _ => "Source ended".to_string(),
            };
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Camera Tracking Receiver");
            ui.separator();

            // Transport section
            ui.group(|ui| {
                ui.label("Transport");

                ui.horizontal(|ui| {
                    ui.radio_value(&mut self.config.transport.kind, TransportKind::Serial, "Serial");
                    ui.radio_value(&mut self.config.transport.kind, TransportKind::Udp, "UDP");
                    ui.checkbox(&mut self.simulate, "Simulate");
                });

                match self.config.transport.kind {
                    TransportKind::Serial => {
                        let previous = self.config.transport.serial_port.clone();
                        ui.horizontal(|ui| {
                            ui.label("Port:");
                            egui::ComboBox::from_id_salt("serial_port")
                                .selected_text(self.config.transport.serial_port.clone())
                                .show_ui(ui, |ui| {
                                    for port in &self.ports {
                                        ui.selectable_value(
                                            &mut self.config.transport.serial_port,
                                            port.clone(),
                                            port.as_str(),
                                        );
                                    }
                                });
                            if ui.button("Refresh").clicked() {
                                self.ports = list_ports();
                            }
                        });
                        // A different port is a different byte stream
                        if previous != self.config.transport.serial_port && self.is_running() {
                            info!("Port changed to {}, restarting", self.config.transport.serial_port);
                            self.restart_session();
                        }
                    }
                    TransportKind::Udp => {
                        let editing = ui.horizontal(|ui| {
                            ui.label("Bind Address:");
                            let addr = ui.text_edit_singleline(&mut self.config.transport.udp_bind_addr);
                            ui.label("Port:");
                            let port = ui.add(egui::DragValue::new(&mut self.config.transport.udp_port));
                            addr.has_focus() || port.has_focus() || port.dragged()
                        }).inner;
                        // Rebind once the edit is finished, not on every keystroke
                        let current = udp_endpoint(&self.config.transport);
                        if endpoint_changed(self.bound_endpoint.as_deref(), &current, editing) {
                            info!("UDP endpoint changed to {}, restarting", current);
                            self.restart_session();
                        }
                    }
                }

                ui.horizontal(|ui| {
                    ui.label("Device ID:");
                    ui.add(egui::DragValue::new(&mut self.config.tracker.device_id));
                });
            });

            ui.separator();

            // Offsets
            ui.group(|ui| {
                ui.label("Offsets");
                Self::axes_row(ui, "Translate:", &mut self.config.tracker.offsets.translate, 0.001);
                Self::axes_row(ui, "Rotate:", &mut self.config.tracker.offsets.rotate, 0.1);
            });

            ui.separator();

            // Lens calibration
            ui.group(|ui| {
                ui.label("Lens Calibration");

                let before = self.config.tracker.calibration;
                ui.horizontal(|ui| {
                    ui.radio_value(&mut self.config.tracker.calibration, CalibrationMode::AutoRange, "Auto range");
                    ui.radio_value(&mut self.config.tracker.calibration, CalibrationMode::Manual, "Manual");
                });
                if before != self.config.tracker.calibration {
                    self.state.issue_command(Command::SetCalibrationMode(self.config.tracker.calibration));
                }

                ui.horizontal(|ui| {
                    if ui.button("Zoom Reset").clicked() {
                        self.state.issue_command(Command::ResetZoom);
                    }
                    if ui.button("Focus Reset").clicked() {
                        self.state.issue_command(Command::ResetFocus);
                    }
                });

                if self.config.tracker.calibration == CalibrationMode::Manual {
                    ui.horizontal(|ui| {
                        if ui.button("Zoom Min").clicked() {
                            self.state.issue_command(Command::SnapshotZoomMin);
                        }
                        if ui.button("Zoom Max").clicked() {
                            self.state.issue_command(Command::SnapshotZoomMax);
                        }
                        if ui.button("Focus Min").clicked() {
                            self.state.issue_command(Command::SnapshotFocusMin);
                        }
                        if ui.button("Focus Max").clicked() {
                            self.state.issue_command(Command::SnapshotFocusMax);
                        }
                    });
                }
            });

            ui.separator();

            // Control buttons
            ui.horizontal(|ui| {
                if self.is_running() {
                    if ui.button("Stop").clicked() {
                        self.stop_session();
                    }
                } else if ui.button("Start").clicked() {
                    self.start_session();
                }

                if ui.button("Save Config").clicked() {
                    match self.config.save_to_file(&self.config_path) {
                        Ok(_) => {
                            self.status_message = "Configuration saved".to_string();
                        }
                        Err(e) => {
                            self.status_message = format!("Failed to save config: {:#}", e);
                        }
                    }
                }
            });

            ui.separator();

            // Channels
            let sample = self.state.snapshot();
            let stats = self.state.stats();
            ui.group(|ui| {
                ui.label("Channels");
                egui::Grid::new("channels").striped(true).show(ui, |ui| {
                    for (name, value) in sample.channels() {
                        ui.monospace(name);
                        ui.monospace(format!("{:>12.4}", value));
                        ui.end_row();
                    }
                });
            });

            // Status section
            ui.group(|ui| {
                ui.horizontal(|ui| {
                    ui.label("Link:");
                    match self.state.link_status() {
                        LinkStatus::Streaming => ui.colored_label(egui::Color32::GREEN, "Streaming"),
                        LinkStatus::Failed(reason) => ui.colored_label(egui::Color32::RED, reason),
                        LinkStatus::Stopped => ui.label("Stopped"),
                        LinkStatus::Idle => ui.label("Idle"),
                    };
                });
                ui.horizontal(|ui| {
                    ui.label("Frames:");
                    ui.label(format!("{} ok, {} rejected", stats.frames_emitted, stats.frames_rejected()));
                });
                ui.horizontal(|ui| {
                    ui.label("Message:");
                    ui.label(&self.status_message);
                });
            });
        });

        self.sync_settings();

        // Request repaint for real-time updates
        if self.is_running() {
            ctx.request_repaint_after(std::time::Duration::from_millis(33));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.stop_session();

        // Auto-save configuration if enabled
        if self.config.gui.auto_save_config {
            if let Err(e) = self.config.save_to_file(&self.config_path) {
                error!("Failed to save config on exit: {:#}", e);
            }
        }
    }
}
