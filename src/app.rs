use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use eframe::egui;
use eframe::egui::{Align, Color32, RichText};

use crate::algorithms::{AlgorithmCategory, PlatformCapabilities};
use crate::config::{self, AppConfig, ConnectionProfile, UiThemeMode};
use crate::logger;
use crate::session::EditSession;
use crate::ssh::{self, CheckMessage};

enum DialogAction {
    None,
    Save,
    Cancel,
    Check,
    ForgetPassword,
}

struct ScriptDeleteDialog {
    index: usize,
    expect: String,
}

pub struct EditorApp {
    config: AppConfig,
    caps: PlatformCapabilities,
    selected_profile: Option<usize>,
    session: Option<EditSession>,
    delete_dialog: Option<ScriptDeleteDialog>,
    check_rx: Option<Receiver<CheckMessage>>,
    status: String,
    style_initialized: bool,
}

impl EditorApp {
    pub fn new() -> Self {
        Self {
            config: config::load(),
            caps: PlatformCapabilities::from_transport(),
            selected_profile: None,
            session: None,
            delete_dialog: None,
            check_rx: None,
            status: String::new(),
            style_initialized: false,
        }
    }

    fn open_session(&mut self, profile: ConnectionProfile, idx: Option<usize>) {
        match EditSession::open(profile, idx, &self.caps) {
            Ok(session) => {
                self.session = Some(session);
                self.selected_profile = idx;
                self.delete_dialog = None;
                self.status.clear();
            }
            Err(err) => {
                // Transport and editor disagree on categories; the profile cannot be edited.
                logger::log_line(logger::CONFIG_LOG, &format!("Cannot edit profile: {err:#}"));
                self.status = format!("Cannot edit profile: {err:#}");
            }
        }
    }

    fn save_session(&mut self) {
        let Some(session) = self.session.take() else { return };
        let name = config::sanitized_profile_name(&session.profile.name);
        self.selected_profile = session.save_into(&mut self.config);
        self.persist(&format!("Saved {name}"));
    }

    fn persist(&mut self, done: &str) {
        self.status = match config::save(&self.config) {
            Ok(()) => done.to_string(),
            Err(err) => {
                logger::log_line(logger::CONFIG_LOG, &format!("Config save failed: {err:#}"));
                format!("Save failed: {err:#}")
            }
        };
    }

    fn forget_password(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        if session.clear_saved_password(&mut self.config) {
            self.persist("Saved password removed");
        }
    }

    fn set_theme(&mut self, mode: UiThemeMode) {
        if self.config.ui_theme_mode == mode {
            return;
        }
        self.config.ui_theme_mode = mode;
        self.style_initialized = false;
        self.persist("Theme saved");
    }

    fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.delete_dialog = None;
    }

    fn start_check(&mut self) {
        let Some(session) = self.session.as_ref() else { return };
        let settings = session.clone().save().settings;
        let (tx, rx) = mpsc::channel();
        ssh::start_check(settings, tx, logger::CHECK_LOG.to_string());
        self.check_rx = Some(rx);
        self.status = "Testing connection...".to_string();
    }

    fn poll_check(&mut self) {
        let Some(rx) = self.check_rx.as_ref() else { return };
        loop {
            match rx.try_recv() {
                Ok(CheckMessage::Status(s)) => self.status = s,
                Ok(CheckMessage::Finished(report)) => {
                    self.status = if report.none_auth_accepted {
                        format!("{}: handshake ok, no authentication required", report.endpoint)
                    } else {
                        format!(
                            "{}: handshake ok, auth methods: {}",
                            report.endpoint, report.auth_methods
                        )
                    };
                    self.check_rx = None;
                    return;
                }
                Ok(CheckMessage::Failed(err)) => {
                    self.status = format!("Connection failed: {err}");
                    self.check_rx = None;
                    return;
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.check_rx = None;
                    return;
                }
            }
        }
    }

    fn draw_profile_list(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Profiles").strong());
        ui.add_space(6.0);

        let mut open: Option<usize> = None;
        egui::ScrollArea::vertical()
            .id_salt("profile_list_scroll")
            .auto_shrink([false, false])
            .max_height(ui.available_height() - 40.0)
            .show(ui, |ui| {
                for (idx, p) in self.config.profiles.iter().enumerate() {
                    let selected = self.selected_profile == Some(idx);
                    let label = config::profile_display_name(p, &self.config);
                    if ui.selectable_label(selected, label).clicked() {
                        open = Some(idx);
                    }
                }
            });
        if let Some(idx) = open {
            if let Some(p) = self.config.profiles.get(idx).cloned() {
                self.open_session(p, Some(idx));
            }
        }

        ui.horizontal(|ui| {
            if ui.button("New").clicked() {
                self.open_session(ConnectionProfile::new(""), None);
            }
            let can_delete = self.selected_profile.is_some();
            if ui.add_enabled(can_delete, egui::Button::new("Delete")).clicked() {
                if let Some(idx) = self.selected_profile.take() {
                    config::delete_profile(&mut self.config, idx);
                    self.session = None;
                    self.persist("Profile deleted");
                }
            }
            let is_default = self
                .selected_profile
                .map(|idx| config::is_default_profile(&self.config, idx))
                .unwrap_or(false);
            let label = if is_default { "Unset default" } else { "Make default" };
            if ui.add_enabled(can_delete, egui::Button::new(label)).clicked() {
                let target = if is_default { None } else { self.selected_profile };
                if config::set_default_profile(&mut self.config, target) {
                    self.persist("Default profile saved");
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label("Theme");
            let mut mode = self.config.ui_theme_mode;
            ui.selectable_value(&mut mode, UiThemeMode::Dark, "Dark");
            ui.selectable_value(&mut mode, UiThemeMode::Light, "Light");
            self.set_theme(mode);
        });
    }

    fn draw_delete_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.delete_dialog.as_ref() else { return };
        let mut keep = false;
        let mut delete = false;
        egui::Window::new("Delete this script?")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(&dialog.expect);
                ui.add_space(8.0);
                ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                    delete = ui.button("Delete").clicked();
                    keep = ui.button("Keep").clicked();
                });
            });

        if delete {
            let index = dialog.index;
            if let Some(session) = self.session.as_mut() {
                session.delete_script(index);
            }
            self.delete_dialog = None;
        } else if keep {
            self.delete_dialog = None;
        }
    }
}

/// Returns true when "Forget saved password" was pressed.
fn draw_connection(ui: &mut egui::Ui, session: &mut EditSession) -> bool {
    let profile = &mut session.profile;
    ui.label("Profile name");
    ui.add(
        egui::TextEdit::singleline(&mut profile.name)
            .hint_text("e.g. prod-1")
            .desired_width(ui.available_width()),
    );
    ui.label("Host");
    ui.add(
        egui::TextEdit::singleline(&mut profile.settings.host)
            .hint_text("example.com")
            .desired_width(ui.available_width()),
    );
    ui.label("Port");
    ui.add(egui::DragValue::new(&mut profile.settings.port).speed(1.0).range(1..=65535));
    ui.label("User");
    ui.add(
        egui::TextEdit::singleline(&mut profile.settings.username)
            .hint_text("root")
            .desired_width(ui.available_width()),
    );

    ui.label("Password (optional)");
    ui.add(
        egui::TextEdit::singleline(&mut profile.settings.password)
            .password(true)
            .desired_width(ui.available_width()),
    );
    ui.checkbox(&mut profile.remember_password, "Remember password");
    let forget = session.has_saved_password() && ui.button("Forget saved password").clicked();

    ui.label("Private key (optional)");
    ui.horizontal(|ui| {
        ui.add(
            egui::TextEdit::singleline(&mut session.profile.settings.private_key_path)
                .desired_width(ui.available_width() - 92.0),
        );
        if ui.button("Browse...").clicked() {
            let mut dlg = rfd::FileDialog::new().set_title("Select private key");
            let home = std::env::var_os("USERPROFILE")
                .or_else(|| std::env::var_os("HOME"))
                .map(PathBuf::from);
            if let Some(home) = home {
                let ssh_dir = home.join(".ssh");
                dlg = dlg.set_directory(if ssh_dir.is_dir() { ssh_dir } else { home });
            }
            if let Some(path) = dlg.pick_file() {
                session.set_private_key(path.display().to_string());
            }
        }
    });
    ui.label("Key passphrase (optional)");
    ui.add(
        egui::TextEdit::singleline(&mut session.profile.settings.key_passphrase)
            .password(true)
            .desired_width(ui.available_width()),
    );
    ui.checkbox(&mut session.profile.remember_key_passphrase, "Remember key passphrase");
    forget
}

fn draw_algorithms(ui: &mut egui::Ui, session: &mut EditSession, caps: &PlatformCapabilities) {
    let categories: Vec<AlgorithmCategory> = session.selection.categories().collect();
    for category in categories {
        let rows: Vec<(String, bool)> = match session.selection.rows(category, caps) {
            Ok(rows) => rows.map(|(name, enabled)| (name.to_string(), enabled)).collect(),
            Err(err) => {
                ui.colored_label(Color32::from_rgb(220, 90, 90), format!("{err:#}"));
                continue;
            }
        };

        let enabled_count = session
            .selection
            .category(category)
            .map(|map| map.enabled().count())
            .unwrap_or(0);
        egui::CollapsingHeader::new(format!("{} ({enabled_count} enabled)", category.label()))
            .id_salt(category.id())
            .default_open(category == AlgorithmCategory::Cipher)
            .show(ui, |ui| {
                for (name, mut enabled) in rows {
                    if ui.checkbox(&mut enabled, &name).changed() {
                        session.toggle(category, &name, enabled);
                    }
                }
            });
    }
}

fn draw_scripts(ui: &mut egui::Ui, session: &mut EditSession) -> Option<usize> {
    enum Move {
        Up(usize),
        Down(usize),
    }
    let mut pending_move = None;
    let mut delete_request = None;

    let count = session.profile.settings.scripts.len();
    egui::Grid::new("login_scripts_grid")
        .num_columns(5)
        .striped(true)
        .show(ui, |ui| {
            ui.label("Expect");
            ui.label("Send");
            ui.label("Regex");
            ui.label("Optional");
            ui.label("");
            ui.end_row();

            for (i, script) in session.profile.settings.scripts.iter_mut().enumerate() {
                ui.text_edit_singleline(&mut script.expect);
                ui.text_edit_singleline(&mut script.send);
                ui.checkbox(&mut script.is_regex, "");
                ui.checkbox(&mut script.optional, "");
                ui.horizontal(|ui| {
                    if ui.add_enabled(i > 0, egui::Button::new("Up")).clicked() {
                        pending_move = Some(Move::Up(i));
                    }
                    if ui.add_enabled(i + 1 < count, egui::Button::new("Down")).clicked() {
                        pending_move = Some(Move::Down(i));
                    }
                    if ui.button("Delete").clicked() {
                        delete_request = Some(i);
                    }
                });
                ui.end_row();
            }

            ui.text_edit_singleline(&mut session.new_script.expect);
            ui.text_edit_singleline(&mut session.new_script.send);
            ui.checkbox(&mut session.new_script.is_regex, "");
            ui.checkbox(&mut session.new_script.optional, "");
            ui.horizontal(|ui| {
                if ui.button("Add").clicked() {
                    session.add_script();
                }
                if ui.button("Clear").clicked() {
                    session.clear_script();
                }
            });
            ui.end_row();
        });

    match pending_move {
        Some(Move::Up(i)) => session.move_script_up(i),
        Some(Move::Down(i)) => session.move_script_down(i),
        None => {}
    }
    delete_request
}

fn draw_dialog(
    ui: &mut egui::Ui,
    session: &mut EditSession,
    caps: &PlatformCapabilities,
    checking: bool,
) -> (DialogAction, Option<usize>) {
    let mut delete_request = None;
    let mut forget = false;
    egui::ScrollArea::vertical()
        .id_salt("edit_connection_scroll")
        .auto_shrink([false, false])
        .max_height(ui.available_height() - 44.0)
        .show(ui, |ui| {
            ui.label(RichText::new("Connection").strong());
            forget = draw_connection(ui, session);
            ui.add_space(10.0);
            ui.separator();

            ui.label(RichText::new("Algorithms").strong());
            draw_algorithms(ui, session, caps);
            ui.add_space(10.0);
            ui.separator();

            ui.label(RichText::new("Login scripts").strong());
            delete_request = draw_scripts(ui, session);
        });

    let mut action = if forget { DialogAction::ForgetPassword } else { DialogAction::None };
    ui.separator();
    ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
        let can_save = !config::sanitized_profile_name(&session.profile.name).is_empty();
        if ui.add_enabled(can_save, egui::Button::new("Save")).clicked() {
            action = DialogAction::Save;
        }
        if ui.button("Cancel").clicked() {
            action = DialogAction::Cancel;
        }
        let can_check = !checking
            && !session.profile.settings.host.trim().is_empty()
            && !session.profile.settings.username.trim().is_empty();
        if ui.add_enabled(can_check, egui::Button::new("Test connection")).clicked() {
            action = DialogAction::Check;
        }
    });
    (action, delete_request)
}

impl eframe::App for EditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.style_initialized {
            ctx.set_visuals(match self.config.ui_theme_mode {
                UiThemeMode::Dark => egui::Visuals::dark(),
                UiThemeMode::Light => egui::Visuals::light(),
            });
            self.style_initialized = true;
        }

        self.poll_check();
        if self.check_rx.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.label(RichText::new(&self.status).color(Color32::GRAY));
        });

        egui::SidePanel::left("profiles_panel")
            .resizable(true)
            .default_width(220.0)
            .show(ctx, |ui| self.draw_profile_list(ui));

        let checking = self.check_rx.is_some();
        let mut action = DialogAction::None;
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(session) = self.session.as_mut() else {
                ui.centered_and_justified(|ui| {
                    ui.label("Select a profile or create a new one.");
                });
                return;
            };
            let (a, delete_request) = draw_dialog(ui, session, &self.caps, checking);
            action = a;
            if let Some(index) = delete_request {
                let expect = session
                    .profile
                    .settings
                    .scripts
                    .get(index)
                    .map(|s| s.expect.clone())
                    .unwrap_or_default();
                self.delete_dialog = Some(ScriptDeleteDialog { index, expect });
            }
        });

        self.draw_delete_dialog(ctx);

        match action {
            DialogAction::Save => self.save_session(),
            DialogAction::Cancel => self.cancel_session(),
            DialogAction::Check => self.start_check(),
            DialogAction::ForgetPassword => self.forget_password(),
            DialogAction::None => {}
        }
    }
}
