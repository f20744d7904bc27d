//! Application bootstrap and main loop
//!
//! Brings up the window, Vulkan instance, surface, elected device and the
//! rendering system, then drives the scene once per frame until the window
//! closes.

use thiserror::Error;

use crate::core::config::{ApplicationConfig, ConfigError};
use crate::ecs::systems::RenderingSystem;
use crate::ecs::World;
use crate::events::StepFunction;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::device_selection::{device_requirements, elect, enumerate_candidates};
use crate::render::vulkan::instance::{VulkanInstance, VulkanSurface};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::window::{Window, WindowError};

/// Fixed simulation step in seconds
pub const FIXED_DELTA: f32 = 1.0 / 60.0;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Windowing failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Application result type
pub type AppResult<T> = Result<T, AppError>;

/// The loop's outcome, unless only the final wait failed
///
/// A wait failure after a frame error is logged and the frame error kept.
fn first_error(frames: AppResult<()>, idle: VulkanResult<()>) -> AppResult<()> {
    match (frames, idle) {
        (Err(frame_error), Err(idle_error)) => {
            log::error!("Waiting for device idle after a failed frame: {}", idle_error);
            Err(frame_error)
        }
        (Err(frame_error), Ok(())) => Err(frame_error),
        (Ok(()), idle) => idle.map_err(AppError::from),
    }
}

/// Editor application: scene, renderer and the platform objects behind them
pub struct Application {
    // Drop order: scene, rendering, device, surface, instance, window.
    world: World,
    rendering: RenderingSystem,
    device_context: DeviceContext,
    surface: VulkanSurface,
    instance: VulkanInstance,
    window: Window,
    tick: StepFunction<f32>,
}

impl Application {
    /// Initialize everything up to a ready-to-render empty scene
    pub fn new(config: &ApplicationConfig) -> AppResult<Self> {
        config.validate()?;

        let window = Window::new(&config.window)?;
        let window_extensions = window.required_instance_extensions()?;

        let instance = VulkanInstance::new(&config.renderer, &window_extensions)?;
        let raw_surface = window.create_surface(instance.instance().handle())?;
        let surface = VulkanSurface::new(&instance, raw_surface);

        let requirements = device_requirements(&config.renderer);
        let candidates = enumerate_candidates(
            instance.instance(),
            instance.surface_loader(),
            surface.handle(),
            &requirements,
            &config.renderer.scoring,
        )?;
        let elected = elect(candidates)?;

        let device_context = DeviceContext::new(
            instance.instance(),
            surface.handle(),
            &elected,
            &requirements,
            window.extent(),
        )?;
        let rendering = RenderingSystem::new(&device_context, config.renderer.invalidate_on_scene_change)?;

        log::info!("{} initialized", config.renderer.application_name);

        Ok(Self {
            world: World::new(),
            rendering,
            device_context,
            surface,
            instance,
            window,
            tick: StepFunction::new(),
        })
    }

    /// Run until the window is closed or Escape is pressed
    pub fn run(&mut self) -> AppResult<()> {
        let frames = self.run_frames();
        let idle = self.device_context.wait_idle();
        first_error(frames, idle)
    }

    fn run_frames(&mut self) -> AppResult<()> {
        let mut frames: u64 = 0;
        loop {
            self.window.poll_events();
            if self.window.should_close() {
                log::info!("Window closed after {} frame(s)", frames);
                return Ok(());
            }

            self.tick.step(&FIXED_DELTA);
            self.rendering.update(&self.device_context, &mut self.world)?;
            frames += 1;
        }
    }

    /// Scene entities and components
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable scene access for setup
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Device, queues and swapchain, for creating shaders and geometry
    pub fn device_context(&self) -> &DeviceContext {
        &self.device_context
    }

    /// Rendering system, mainly for its render pass
    pub fn rendering_system(&self) -> &RenderingSystem {
        &self.rendering
    }

    /// Per-frame tick; listeners receive the fixed delta
    pub fn tick_mut(&mut self) -> &mut StepFunction<f32> {
        &mut self.tick
    }

    /// Vulkan instance the device was elected from
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    /// Handle of the surface being presented to
    pub fn surface(&self) -> ash::vk::SurfaceKHR {
        self.surface.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delta_is_sixty_hertz() {
        approx::assert_relative_eq!(FIXED_DELTA * 60.0, 1.0);
    }

    #[test]
    fn test_frame_error_wins_over_idle_error() {
        let frames: AppResult<()> = Err(VulkanError::invalid("frame").into());
        let idle: VulkanResult<()> = Err(VulkanError::NoSuitableMemoryType);

        let error = first_error(frames, idle).expect_err("frame error");
        assert!(error.to_string().contains("frame"));
    }

    #[test]
    fn test_idle_error_reported_after_clean_loop() {
        let error = first_error(Ok(()), Err(VulkanError::NoSuitableDevice)).expect_err("idle error");
        assert!(matches!(error, AppError::Vulkan(VulkanError::NoSuitableDevice)));
        assert!(first_error(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn test_config_error_converts() {
        let error: AppError = ConfigError::Parse("bad".to_string()).into();
        assert!(matches!(error, AppError::Config(_)));
        assert!(error.to_string().contains("bad"));
    }
}
