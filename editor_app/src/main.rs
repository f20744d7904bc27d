//! OverEditor
//!
//! Opens the editor window with a small demo scene: one camera looking at two
//! colored cubes that share a shader.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use overeditor::foundation::logging;
use overeditor::prelude::*;

const CONFIG_PATH: &str = "overeditor.toml";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ColoredVertex {
    position: [f32; 3],
    color: [f32; 3],
}

const fn vertex(position: [f32; 3], color: [f32; 3]) -> ColoredVertex {
    ColoredVertex { position, color }
}

fn cube() -> (Vec<ColoredVertex>, Vec<u16>) {
    let vertices = vec![
        vertex([-0.5, -0.5, -0.5], [1.0, 0.0, 0.0]),
        vertex([0.5, -0.5, -0.5], [0.0, 1.0, 0.0]),
        vertex([0.5, 0.5, -0.5], [0.0, 0.0, 1.0]),
        vertex([-0.5, 0.5, -0.5], [1.0, 1.0, 0.0]),
        vertex([-0.5, -0.5, 0.5], [1.0, 0.0, 1.0]),
        vertex([0.5, -0.5, 0.5], [0.0, 1.0, 1.0]),
        vertex([0.5, 0.5, 0.5], [1.0, 1.0, 1.0]),
        vertex([-0.5, 0.5, 0.5], [0.2, 0.2, 0.2]),
    ];
    // Clockwise when seen from outside, with Y pointing down on screen.
    let indices = vec![
        0, 3, 2, 2, 1, 0, // front (-Z)
        4, 5, 6, 6, 7, 4, // back (+Z)
        0, 4, 7, 7, 3, 0, // left
        1, 2, 6, 6, 5, 1, // right
        0, 1, 5, 5, 4, 0, // top (-Y)
        3, 7, 6, 6, 2, 3, // bottom (+Y)
    ];
    (vertices, indices)
}

fn vertex_layout() -> VertexLayout {
    VertexLayout::new(vec![VertexElement::floats(3), VertexElement::floats(3)])
}

fn load_shader(app: &Application, config: &ShaderConfig) -> VulkanResult<Arc<Shader>> {
    let vertex = ShaderSource::from_file(&config.vertex_shader_path)?
        .with_descriptors(vec![DescriptorLayout::new(vec![CameraMatrices::descriptor()])])
        .with_vertex_layout(vertex_layout())
        .with_push_constants(PushConstantsLayout::new(vec![PushConstantElement::matrix()]));
    let fragment = ShaderSource::from_file(&config.fragment_shader_path)?;

    let shader = Shader::new(
        app.device_context(),
        app.rendering_system().render_pass(),
        vertex,
        fragment,
    )?;
    Ok(Arc::new(shader))
}

fn build_scene(app: &mut Application, config: &ApplicationConfig) -> VulkanResult<()> {
    let shader = load_shader(app, &config.renderer.shaders)?;

    let (vertices, indices) = cube();
    let geometry = Arc::new(GeometryBuffer::from_vertices(
        app.device_context(),
        vertex_layout(),
        &vertices,
        &indices,
    )?);

    let camera = Camera::new(
        app.device_context(),
        app.rendering_system().render_pass(),
        60.0,
        config.window.aspect_ratio(),
        100.0,
    )?;

    let world = app.world_mut();

    let camera_entity = world.create_entity();
    world.add_component(camera_entity, camera);
    world.add_component(
        camera_entity,
        TransformComponent::from_position(Vec3::new(0.0, 1.0, -4.0))
            .with_rotation_euler(0.25, 0.0, 0.0),
    );

    for (offset, spin) in [(-0.8_f32, 0.4_f32), (0.8, -0.4)] {
        let entity = world.create_entity();
        world.add_component(entity, Drawable::new(Arc::clone(&geometry), Arc::clone(&shader)));
        world.add_component(
            entity,
            TransformComponent::from_position(Vec3::new(offset, 0.0, 0.0))
                .with_rotation_euler(0.0, spin, 0.0)
                .with_uniform_scale(0.8),
        );
    }

    log::info!("Scene built with {} entities", world.entity_count());
    Ok(())
}

fn run() -> Result<(), AppError> {
    logging::init_deferred();
    let config = ApplicationConfig::load_or_default(CONFIG_PATH)?;
    logging::set_level(&config.engine.log_level);

    let mut app = Application::new(&config)?;
    build_scene(&mut app, &config)?;

    let elapsed = Rc::new(Cell::new(0.0_f32));
    let seconds = Rc::clone(&elapsed);
    app.tick_mut().late_mut().register(move |delta: &f32| {
        let before = seconds.get();
        seconds.set(before + delta);
        if before.floor() < seconds.get().floor() {
            log::debug!("Editor running for {:.0} s", seconds.get());
        }
    });

    app.run()?;
    log::info!("Exiting after {:.1} s", elapsed.get());
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        log::error!("{}", error);
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
