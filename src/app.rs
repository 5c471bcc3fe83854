//! The egui window around a [`Controller`].

use crate::controller::{Controller, FormatChoice, NoticeTone};
use crate::model::{AUDIO_BITRATES, VIDEO_HEIGHTS};
use crate::thumbnail;
use eframe::egui::{self, Color32, ColorImage, RichText, TextureOptions};
use eframe::{App, Frame};
use rfd::FileDialog;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Application state for the GUI
pub struct BrejaxApp {
    controller: Controller,
    /// Runtime that also hosts the download jobs
    runtime: Arc<Runtime>,
    /// Whether yt-dlp was found at startup
    has_extractor: bool,
    /// Preview of the current item
    thumbnail: Option<egui::TextureHandle>,
    /// Incoming thumbnail fetch result
    thumbnail_result: Arc<Mutex<Option<ColorImage>>>,
}

impl BrejaxApp {
    pub fn new(controller: Controller, runtime: Arc<Runtime>, has_extractor: bool) -> Self {
        Self {
            controller,
            runtime,
            has_extractor,
            thumbnail: None,
            thumbnail_result: Arc::new(Mutex::new(None)),
        }
    }

    fn request_thumbnail(&mut self, ctx: &egui::Context, url: String) {
        self.thumbnail = None;
        let results = Arc::clone(&self.thumbnail_result);
        let ctx = ctx.clone();
        self.runtime.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&url) {
                if let Ok(mut slot) = results.lock() {
                    *slot = Some(img);
                }
                ctx.request_repaint();
            } else {
                log::debug!("no thumbnail from {url}");
            }
        });
    }

    fn take_fetched_thumbnail(&mut self, ctx: &egui::Context) {
        let fetched = self.thumbnail_result.lock().ok().and_then(|mut s| s.take());
        if let Some(img) = fetched {
            self.thumbnail = Some(ctx.load_texture("thumbnail", img, TextureOptions::default()));
        }
    }

    fn options_ui(&mut self, ui: &mut egui::Ui) {
        let form = &mut self.controller.form;

        ui.label("Media link:");
        ui.add(
            egui::TextEdit::singleline(&mut form.url)
                .hint_text("https://www.youtube.com/watch?v=...")
                .desired_width(f32::INFINITY),
        );

        ui.horizontal(|ui| {
            ui.label("Save to:");
            ui.text_edit_singleline(&mut form.output_dir);
            if ui.button("Browse…").clicked() {
                if let Some(folder) = FileDialog::new().set_directory(&form.output_dir).pick_folder() {
                    form.output_dir = folder.display().to_string();
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label("Format:");
            egui::ComboBox::from_id_source("format")
                .selected_text(form.format.label())
                .show_ui(ui, |ui| {
                    for choice in FormatChoice::all() {
                        ui.selectable_value(&mut form.format, choice, choice.label());
                    }
                });

            match form.format {
                FormatChoice::Audio(codec) if !codec.is_lossless() => {
                    ui.label("Quality:");
                    egui::ComboBox::from_id_source("bitrate")
                        .selected_text(format!("{} kbps", form.bitrate_kbps))
                        .show_ui(ui, |ui| {
                            for kbps in AUDIO_BITRATES {
                                ui.selectable_value(&mut form.bitrate_kbps, kbps, format!("{kbps} kbps"));
                            }
                        });
                }
                FormatChoice::Video => {
                    ui.label("Resolution:");
                    let selected = match form.resolution {
                        Some(h) => format!("{h}p"),
                        None => "Auto (best)".to_string(),
                    };
                    egui::ComboBox::from_id_source("resolution")
                        .selected_text(selected)
                        .show_ui(ui, |ui| {
                            ui.selectable_value(&mut form.resolution, None, "Auto (best)");
                            for h in VIDEO_HEIGHTS {
                                ui.selectable_value(&mut form.resolution, Some(h), format!("{h}p"));
                            }
                        });
                }
                _ => {}
            }
        });

        ui.horizontal_wrapped(|ui| {
            ui.checkbox(&mut form.playlist, "Whole playlist");
            ui.checkbox(&mut form.embed_metadata, "Embed metadata");
            ui.checkbox(&mut form.save_thumbnail, "Save thumbnail");
            ui.checkbox(&mut form.open_folder, "Open folder when done");
        });
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.controller.notice().cloned() else {
            return;
        };
        let color = match notice.tone {
            NoticeTone::Success => Color32::LIGHT_GREEN,
            NoticeTone::Error => Color32::LIGHT_RED,
            NoticeTone::Cancelled => Color32::GRAY,
        };
        let mut dismissed = false;
        egui::Window::new(&notice.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(RichText::new(&notice.message).color(color));
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.controller.dismiss_notice();
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for BrejaxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Pull job events first so the frame shows the latest state
        self.controller.poll();
        if let Some(url) = self.controller.take_thumbnail_request() {
            self.request_thumbnail(ctx, url);
        }
        self.take_fetched_thumbnail(ctx);

        let busy = self.controller.is_busy();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Brejax Downloader");

            if !self.has_extractor {
                ui.colored_label(Color32::LIGHT_RED, "yt-dlp was not found; downloads will fail.");
            }
            if !self.controller.has_transcoder() {
                ui.colored_label(
                    Color32::YELLOW,
                    "ffmpeg was not found; only \"Best audio (no conversion)\" without extras is available.",
                );
            }

            ui.add_enabled_ui(!busy, |ui| self.options_ui(ui));
            self.controller.options_changed();

            ui.separator();
            ui.horizontal(|ui| {
                if let Some(tex) = &self.thumbnail {
                    ui.image((tex.id(), tex.size_vec2()));
                }
                ui.vertical(|ui| {
                    ui.label(RichText::new(self.controller.status()).strong());
                    if busy {
                        let bar = match self.controller.progress() {
                            Some(p) => egui::ProgressBar::new(p).show_percentage(),
                            None => egui::ProgressBar::new(0.0).animate(true),
                        };
                        ui.add(bar);
                    }
                });
            });

            ui.horizontal(|ui| {
                if ui.add_enabled(!busy, egui::Button::new("Start")).clicked() {
                    if let Err(e) = self.controller.start() {
                        log::info!("start rejected: {e}");
                    }
                }
                if ui.add_enabled(busy, egui::Button::new("Stop")).clicked() {
                    self.controller.stop();
                }
            });

            ui.separator();
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in self.controller.log_lines() {
                        ui.monospace(line);
                    }
                });
        });

        self.notice_ui(ctx);

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
