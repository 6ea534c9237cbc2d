//! A minimal GUI for displaying frames.
//!
//! Windowing systems want their event loop on the main thread, so [`run`] takes over the main
//! thread and runs the application on a second one. Images are sent to the event loop with
//! [`show_image`], which opens one window per key on first use.
//!
//! Closing a window sets a flag that can be queried with [`is_closed`] (and through
//! [`Window::is_open`]), after which no further images are displayed. The application is expected
//! to notice this and return, and its result decides the exit code of the process.

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    pipeline::FrameSink,
    termination::Termination,
    ColorEncoding, Frame,
};

use self::renderer::{Gpu, NativeWindow, Renderer};

static CLOSED: AtomicBool = AtomicBool::new(false);

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new(gpu: Gpu) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        }
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");

            let win = NativeWindow::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu.clone())?;

            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, data);
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn close(&mut self, win: WindowId) {
        if let Some(key) = self.win_id_to_key.remove(&win) {
            log::info!("window '{key}' closed");
            self.windows.remove(&key);
        }
        CLOSED.store(true, Ordering::SeqCst);
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if is_closed() {
                        return;
                    }
                    if let Err(e) = self.show(target, key, res, &data) {
                        log::error!("failed to display image: {e:#}");
                        CLOSED.store(true, Ordering::SeqCst);
                    }
                }
                Event::WindowEvent {
                    window_id,
                    event: WindowEvent::CloseRequested,
                } => self.close(window_id),
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        renderer.redraw();
                    }
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

/// Channel to the event loop, set by [`run`].
static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

fn send(msg: Msg) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .ok_or_else(|| anyhow!("GUI is not running (use `gui::run`)"))?
        .lock()
        .map_err(|_| anyhow!("GUI event loop proxy is poisoned"))?;
    proxy
        .send_event(msg)
        .map_err(|_closed| anyhow!("GUI event loop has exited"))
}

/// Runs the GUI event loop on the calling thread and `app` on a new thread.
///
/// This must be called from the main thread. The process exits when `app` returns, with an exit
/// code of 0 if its result indicates success, 1 otherwise, and 101 if it panics.
pub fn run<F, R>(app: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        log::error!("`gui::run` called more than once");
        process::exit(1);
    }

    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            log::error!("failed to open GPU: {e:#}");
            process::exit(1);
        }
    };

    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(app));
        match result {
            Ok(r) => {
                if r.is_success() {
                    process::exit(0);
                } else {
                    r.report(); // prints the error
                    process::exit(1);
                }
            }
            Err(_payload) => {
                // The panic hook has printed the message already, exit with 101 like libstd.
                process::exit(101);
            }
        }
    });

    Gui::new(gpu).run(event_loop);
}

/// Returns whether the user closed a window.
pub fn is_closed() -> bool {
    CLOSED.load(Ordering::SeqCst)
}

/// Displays an image in the window named `key`.
///
/// The window is created when the first image is sent to it. Fails if the GUI is not running.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
    let data = image.data().to_vec();

    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data,
    })
}

/// A named window that [`Frame`]s can be shown in.
#[derive(Debug, Clone)]
pub struct Window {
    key: String,
}

impl Window {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FrameSink for Window {
    fn show(&mut self, frame: &Frame) -> anyhow::Result<()> {
        match frame.encoding() {
            ColorEncoding::Rgb => show_image(&*self.key, frame.image()),
            ColorEncoding::Bgr => {
                show_image(&*self.key, frame.to_encoding(ColorEncoding::Rgb).image())
            }
        }
    }

    fn is_open(&self) -> bool {
        !is_closed()
    }
}
