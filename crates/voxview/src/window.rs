use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use panels::{SharedDevice, WgpuDevice};
use viewconfig::ViewerConfig;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::context::GpuContext;
use crate::overlay::{srgb_to_linear, OverlayPipeline};
use crate::scene::Scene;

/// GPU state for the interactive window. Fields drop top to bottom, so the
/// scene releases its panels before the surface and the window go away.
struct WindowState {
    scene: Option<Scene<WgpuDevice>>,
    overlay: OverlayPipeline,
    device: SharedDevice<WgpuDevice>,
    context: GpuContext,
    clear: wgpu::Color,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &ViewerConfig) -> Result<Self> {
        let context = GpuContext::new(window.as_ref(), window.inner_size())?;
        let device = SharedDevice::new(WgpuDevice::new(
            context.device.clone(),
            context.queue.clone(),
        ));
        let overlay = OverlayPipeline::new(
            &context.device,
            &context.queue,
            context.config.format,
            device.borrow().texture_layout(),
            (context.size.width, context.size.height),
        );
        let scene = Scene::new(&device, config)?;

        let [r, g, b] = config.window.clear_color;
        Ok(Self {
            scene: Some(scene),
            overlay,
            device,
            context,
            clear: wgpu::Color {
                r: srgb_to_linear(r),
                g: srgb_to_linear(g),
                b: srgb_to_linear(b),
                a: 1.0,
            },
            window,
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
        self.overlay
            .resize(&self.context.queue, new_size.width, new_size.height);
    }

    fn render(&mut self) -> Result<()> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.resize(self.context.size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout; retrying next frame");
                return Ok(());
            }
            Err(err) => return Err(anyhow!("failed to acquire surface texture: {err}")),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("voxview frame"),
                });

        let panels = self
            .scene
            .as_ref()
            .map(Scene::panels)
            .unwrap_or_default();
        {
            let gpu = self.device.borrow();
            self.overlay
                .draw(&mut encoder, &view, self.clear, &panels, &gpu);
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        if let Some(scene) = self.scene.as_mut() {
            scene.frame_presented(Instant::now())?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(scene) = self.scene.take() {
            if let Some(block) = scene.selected_block() {
                tracing::info!(block, "final block selection");
            }
            scene.shutdown();
        }
    }
}

pub fn run(config: &ViewerConfig) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title(config.window.title.as_str())
        .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create viewer window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, config)?;
    tracing::info!(
        width = config.window.width,
        height = config.window.height,
        "viewer window ready"
    );

    let mut result = Ok(());
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Pressed
                        && matches!(event.logical_key, Key::Named(NamedKey::Escape))
                    {
                        elwt.exit();
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    if let Some(scene) = state.scene.as_mut() {
                        scene.cursor_moved(position.x, position.y);
                    }
                }
                WindowEvent::MouseInput {
                    state: button_state,
                    button: MouseButton::Left,
                    ..
                } => {
                    if let Some(scene) = state.scene.as_mut() {
                        match button_state {
                            ElementState::Pressed => scene.left_pressed(),
                            ElementState::Released => scene.left_released(),
                        }
                    }
                }
                WindowEvent::Resized(new_size) => state.resize(new_size),
                WindowEvent::RedrawRequested => {
                    if let Err(err) = state.render() {
                        tracing::error!(error = %err, "frame failed; exiting");
                        result = Err(err);
                        elwt.exit();
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            state.window().request_redraw();
            elwt.set_control_flow(ControlFlow::Poll);
        }
        Event::LoopExiting => state.shutdown(),
        _ => {}
    });

    if let Err(err) = run_result {
        result = Err(anyhow!("window event loop error: {err}"));
    }

    result
}
