//! Viewer application state, input and HUD.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use egui::{Align2, CentralPanel, Color32, ColorImage, FontId, Pos2, Rect, Sense, TextureHandle, TextureOptions};

use crate::accumulation::{run_interactive_frame, DisplaySink};
use crate::backend::{Backend, OutputBuffer};
use crate::camera::Drag;
use crate::output;
use crate::session::RenderSession;
use crate::util::{Result, Vec2};

/// Screenshot written by the `s` key.
const SCREENSHOT_PATH: &str = "redflash.png";

/// Presents the output buffer as an egui texture.
///
/// With interop the texture persists and is updated in place; without it a
/// fresh texture is allocated for every frame.
pub struct TextureDisplay {
    ctx: egui::Context,
    interop: bool,
    texture: Option<TextureHandle>,
    frame_number: u32,
}

impl TextureDisplay {
    pub fn new(ctx: egui::Context, interop: bool) -> Self {
        Self {
            ctx,
            interop,
            texture: None,
            frame_number: 0,
        }
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    /// Frame number of the last presented frame.
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Drop the texture of a stale viewport size.
    pub fn discard(&mut self) {
        self.texture = None;
    }
}

impl DisplaySink for TextureDisplay {
    fn present(&mut self, output: &OutputBuffer, frame_number: u32) -> Result<()> {
        let (w, h) = output.dimensions();
        let image = ColorImage::from_rgba_unmultiplied([w as usize, h as usize], &output::to_rgba8(output));
        match &mut self.texture {
            Some(tex) if self.interop => tex.set(image, TextureOptions::LINEAR),
            _ => self.texture = Some(self.ctx.load_texture("redflash-output", image, TextureOptions::LINEAR)),
        }
        self.frame_number = frame_number;
        Ok(())
    }
}

/// Main viewer application
pub struct ViewerApp<B: Backend> {
    session: RenderSession<B>,
    display: TextureDisplay,
    failure: Rc<RefCell<Option<String>>>,
    status_message: String,
}

impl<B: Backend> ViewerApp<B> {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        session: RenderSession<B>,
        interop: bool,
        failure: Rc<RefCell<Option<String>>>,
    ) -> Self {
        log::info!("viewer started (display interop {})", if interop { "on" } else { "off" });
        Self {
            session,
            display: TextureDisplay::new(cc.egui_ctx.clone(), interop),
            failure,
            status_message: String::new(),
        }
    }

    fn fail(&mut self, ctx: &egui::Context, err: impl std::fmt::Display) {
        log::error!("{err}");
        *self.failure.borrow_mut() = Some(err.to_string());
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn save_screenshot(&mut self) {
        self.status_message = match output::save(Path::new(SCREENSHOT_PATH), self.session.output()) {
            Ok(()) => {
                log::info!("saved {SCREENSHOT_PATH}");
                format!("Saved {SCREENSHOT_PATH}")
            }
            Err(e) => {
                log::warn!("screenshot failed: {e}");
                format!("Save failed: {e}")
            }
        };
    }

    /// Mouse drags in output pixels: left orbits, right dollies, middle pans.
    fn handle_input(&mut self, response: &egui::Response, pixels_per_point: f32) {
        let Some(pos) = response.interact_pointer_pos() else {
            return;
        };
        let delta = response.drag_delta();
        if delta == egui::Vec2::ZERO {
            return;
        }
        let to = (pos - response.rect.min) * pixels_per_point;
        let from = to - delta * pixels_per_point;
        let drag = Drag::new(Vec2::new(from.x, from.y), Vec2::new(to.x, to.y));

        let camera = self.session.camera_mut();
        if response.dragged_by(egui::PointerButton::Primary) {
            camera.apply_orbit(drag);
        } else if response.dragged_by(egui::PointerButton::Secondary) {
            camera.apply_dolly(drag);
        } else if response.dragged_by(egui::PointerButton::Middle) {
            camera.apply_pan(drag);
        }
    }

    fn draw_hud(&self, ui: &egui::Ui, rect: Rect, fps: f32) {
        let camera = self.session.camera();
        let (eye, lookat) = (camera.eye(), camera.lookat());
        let mut text = format!(
            "frame {}\neye    {:.2} {:.2} {:.2}\nlookat {:.2} {:.2} {:.2}\n{:.1} fps",
            self.display.frame_number(),
            eye.x,
            eye.y,
            eye.z,
            lookat.x,
            lookat.y,
            lookat.z,
            fps,
        );
        if !self.status_message.is_empty() {
            text.push('\n');
            text.push_str(&self.status_message);
        }
        let painter = ui.painter();
        let origin = rect.left_top() + egui::vec2(8.0, 8.0);
        painter.text(origin + egui::vec2(1.0, 1.0), Align2::LEFT_TOP, &text, FontId::monospace(12.0), Color32::BLACK);
        painter.text(origin, Align2::LEFT_TOP, text, FontId::monospace(12.0), Color32::WHITE);
    }
}

impl<B: Backend> eframe::App for ViewerApp<B> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let _span = tracing::info_span!("viewer_update").entered();

        if ctx.input(|i| i.key_pressed(egui::Key::Escape) || i.key_pressed(egui::Key::Q)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::S)) {
            self.save_screenshot();
        }

        let ppp = ctx.pixels_per_point();
        let fps = ctx.input(|i| if i.stable_dt > 0.0 { 1.0 / i.stable_dt } else { 0.0 });

        CentralPanel::default().frame(egui::Frame::NONE).show(ctx, |ui| {
            let rect = ui.available_rect_before_wrap();
            let width = (rect.width() * ppp).round() as u32;
            let height = (rect.height() * ppp).round() as u32;

            match self.session.resize(width, height) {
                Ok(true) => self.display.discard(),
                Ok(false) => {}
                Err(e) => return self.fail(ctx, e),
            }

            let response = ui.allocate_rect(rect, Sense::drag());
            self.handle_input(&response, ppp);

            if let Err(e) = run_interactive_frame(&mut self.session, &mut self.display) {
                return self.fail(ctx, e);
            }

            if let Some(tex) = self.display.texture() {
                let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                ui.painter().image(tex.id(), rect, uv, Color32::WHITE);
            }
            self.draw_hud(ui, rect, fps);
        });

        ctx.request_repaint();
    }
}
