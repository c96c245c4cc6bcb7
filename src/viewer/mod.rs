//! Interactive viewer: one progressive frame per repaint.

mod app;

pub use app::{TextureDisplay, ViewerApp};

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::backend::Backend;
use crate::config::RenderConfig;
use crate::session::RenderSession;

/// Open a window of the configured size and drive `session` until closed.
pub fn run<B: Backend + 'static>(session: RenderSession<B>, config: &RenderConfig) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.width as f32, config.height as f32])
            .with_title("redflash"),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    let failure = Rc::new(RefCell::new(None));
    let app_failure = Rc::clone(&failure);
    let interop = config.display_interop;

    eframe::run_native(
        "redflash",
        options,
        Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, session, interop, app_failure)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run: {}", e))?;

    let result = match failure.borrow_mut().take() {
        Some(err) => Err(anyhow::anyhow!(err)),
        None => Ok(()),
    };
    result
}
