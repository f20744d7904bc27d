//! # Rendering System
//!
//! Renders every camera entity once per frame:
//!
//! 1. acquire the next swapchain image
//! 2. collect drawables with their model matrices, grouped by shader
//! 3. fetch or record the camera's secondary command buffer for each shader
//! 4. write the camera matrices
//! 5. record the primary buffer executing the secondaries in shader order
//! 6. submit, present and wait for the queue to drain
//!
//! An empty scene still clears and presents the acquired image.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use ash::{vk, Device};

use crate::ecs::components::{Camera, DrawSignature, Drawable, DrawingInstructions, TransformComponent};
use crate::ecs::{Entity, World};
use crate::foundation::math::Mat4;
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::descriptors::DescriptorsController;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::ShaderId;
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One drawable and the model matrix it is drawn with
#[derive(Clone)]
pub struct DrawItem {
    /// Geometry and shader
    pub drawable: Drawable,
    /// Model matrix from the entity's transform
    pub model: Mat4,
}

/// Bucket records by shader; buckets iterate in ascending shader id order
pub fn group_by_shader<T>(records: impl IntoIterator<Item = (ShaderId, T)>) -> BTreeMap<ShaderId, Vec<T>> {
    let mut groups: BTreeMap<ShaderId, Vec<T>> = BTreeMap::new();
    for (shader, record) in records {
        groups.entry(shader).or_default().push(record);
    }
    groups
}

/// What to do with a camera's cached command buffer for one shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Execute the cached buffer as is
    Reuse,
    /// Nothing cached yet: allocate descriptors and record
    Record,
    /// Cached buffer is stale: record it again with the same descriptors
    Rerecord,
}

/// Decide how to serve `current` given what was cached
pub fn cache_action(cached: Option<&DrawSignature>, current: &DrawSignature, invalidate: bool) -> CacheAction {
    match cached {
        None => CacheAction::Record,
        Some(signature) if invalidate && signature != current => CacheAction::Rerecord,
        Some(_) => CacheAction::Reuse,
    }
}

/// Cache entry that remembers which draws it was recorded with
pub trait CachedDraws {
    /// Draws the entry currently holds
    fn signature(&self) -> &DrawSignature;
    /// Mark the entry as recorded with `signature`
    fn set_signature(&mut self, signature: DrawSignature);
}

impl CachedDraws for DrawingInstructions {
    fn signature(&self) -> &DrawSignature {
        &self.signature
    }

    fn set_signature(&mut self, signature: DrawSignature) {
        self.signature = signature;
    }
}

/// Serve the cache entry for `shader_id`, recording or re-recording it as [`cache_action`] decides
pub fn refresh_cached<'a, V: CachedDraws, E>(
    cache: &'a mut HashMap<ShaderId, V>,
    shader_id: ShaderId,
    signature: DrawSignature,
    invalidate: bool,
    record: impl FnOnce(DrawSignature) -> Result<V, E>,
    rerecord: impl FnOnce(&mut V) -> Result<(), E>,
) -> Result<&'a mut V, E> {
    let action = cache_action(
        cache.get(&shader_id).map(CachedDraws::signature),
        &signature,
        invalidate,
    );
    match (action, cache.entry(shader_id)) {
        (_, Entry::Vacant(slot)) => Ok(slot.insert(record(signature)?)),
        (CacheAction::Rerecord, Entry::Occupied(slot)) => {
            let entry = slot.into_mut();
            rerecord(entry)?;
            entry.set_signature(signature);
            Ok(entry)
        }
        (_, Entry::Occupied(slot)) => Ok(slot.into_mut()),
    }
}

/// Record draws for `items`, which all share one shader
fn record_draws(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    controller: &DescriptorsController,
    items: &[DrawItem],
) -> VulkanResult<()> {
    let Some(first) = items.first() else {
        return Err(VulkanError::invalid("Nothing to record"));
    };
    let shader = &first.drawable.shader;
    let layout = shader.pipeline_layout();
    let model_range = shader.model_push_range();

    let mut recorder = CommandRecorder::begin_secondary(device.clone(), command_buffer, render_pass)?;
    recorder.bind_descriptor_sets(layout, controller.sets());
    recorder.bind_pipeline(shader.pipeline());

    for item in items {
        if let Some(range) = model_range {
            recorder.push_constants(
                layout,
                range.stage_flags,
                range.offset,
                bytemuck::cast_slice(item.model.as_slice()),
            );
        }
        let geometry = &item.drawable.geometry;
        recorder.bind_vertex_buffer(geometry.vertex_buffer());
        recorder.bind_index_buffer(geometry.index_buffer());
        recorder.draw_indexed(geometry.index_count());
    }

    recorder.end()?;
    Ok(())
}

/// Per-frame scheduler owning the render pass and its presentation resources
pub struct RenderingSystem {
    // Field order is teardown order; the pool waits for the device first.
    command_pool: CommandPool,
    sync: FrameSync,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    primary: vk::CommandBuffer,
    invalidate_on_scene_change: bool,
}

impl RenderingSystem {
    /// Create the render pass, one framebuffer per swapchain image, the command pool and semaphores
    pub fn new(context: &DeviceContext, invalidate_on_scene_change: bool) -> VulkanResult<Self> {
        let device = context.device();
        let swapchain = context.swapchain();

        let render_pass = RenderPass::new_color_pass(device.clone(), swapchain.format().format)?;
        let command_pool = CommandPool::new(device.clone(), context.queues().graphics_family())?;
        let primary = command_pool.allocate_primary()?;
        let framebuffers = Framebuffer::for_swapchain(device, render_pass.handle(), swapchain)?;
        let sync = FrameSync::new(device)?;

        log::info!(
            "Rendering system ready: {} framebuffer(s) at {}x{}",
            framebuffers.len(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            command_pool,
            sync,
            framebuffers,
            render_pass,
            primary,
            invalidate_on_scene_change,
        })
    }

    /// Render pass cameras and shaders must be created for
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Render one frame per camera
    pub fn update(&mut self, context: &DeviceContext, world: &mut World) -> VulkanResult<()> {
        let cameras: Vec<(Entity, TransformComponent)> = world
            .query2::<Camera, TransformComponent>()
            .map(|(entity, _, transform)| (entity, transform.clone()))
            .collect();

        for (entity, transform) in cameras {
            self.render(context, world, entity, &transform)?;
        }
        Ok(())
    }

    fn collect(world: &World) -> BTreeMap<ShaderId, Vec<DrawItem>> {
        group_by_shader(
            world
                .query2::<TransformComponent, Drawable>()
                .map(|(_, transform, drawable)| {
                    let item = DrawItem {
                        drawable: drawable.clone(),
                        model: transform.to_matrix(),
                    };
                    (drawable.shader_id(), item)
                }),
        )
    }

    fn render(
        &mut self,
        context: &DeviceContext,
        world: &mut World,
        camera_entity: Entity,
        camera_transform: &TransformComponent,
    ) -> VulkanResult<()> {
        let swapchain = context.swapchain();
        let image_index = swapchain.acquire_next_image(self.sync.image_available.handle())?;

        let groups = Self::collect(world);
        let camera = world
            .get_component_mut::<Camera>(camera_entity)
            .ok_or_else(|| VulkanError::invalid("Camera entity lost its camera"))?;

        let mut secondary = Vec::with_capacity(groups.len());
        for (shader_id, items) in &groups {
            secondary.push(self.bind_or_create(context, camera, *shader_id, items)?);
        }

        camera.update_matrices(camera_transform)?;

        self.record_primary(context, image_index, &secondary)?;
        self.submit(context)?;
        swapchain.present(
            context.queues().presentation(),
            image_index,
            self.sync.render_finished.handle(),
        )?;
        self.wait_queues_idle(context)
    }

    fn bind_or_create(
        &self,
        context: &DeviceContext,
        camera: &mut Camera,
        shader_id: ShaderId,
        items: &[DrawItem],
    ) -> VulkanResult<vk::CommandBuffer> {
        let signature = DrawSignature::new(
            items
                .iter()
                .map(|item| (item.drawable.geometry.id(), item.model)),
        );
        let render_pass = camera.render_pass();
        let (matrices, cache) = camera.draw_cache_mut();

        let instructions = refresh_cached(
            cache,
            shader_id,
            signature,
            self.invalidate_on_scene_change,
            |signature| -> VulkanResult<DrawingInstructions> {
                let shader = items
                    .first()
                    .map(|item| &item.drawable.shader)
                    .ok_or_else(|| VulkanError::invalid("Empty draw group"))?;
                let controller = DescriptorsController::create_for(
                    context,
                    &shader.descriptor_layouts(),
                    &shader.set_layout_handles(),
                )?;
                controller.write_bindings(Some(matrices))?;

                let command_buffer = self.command_pool.allocate_secondary()?;
                record_draws(context.device(), command_buffer, render_pass, &controller, items)?;
                log::debug!("Recorded {} draw(s) for shader {:?}", signature.len(), shader_id);

                Ok(DrawingInstructions {
                    controller,
                    command_buffer,
                    signature,
                })
            },
            |instructions: &mut DrawingInstructions| {
                log::debug!("Re-recording {} draw(s) for shader {:?}", items.len(), shader_id);
                record_draws(
                    context.device(),
                    instructions.command_buffer,
                    render_pass,
                    &instructions.controller,
                    items,
                )
            },
        )?;
        Ok(instructions.command_buffer)
    }

    fn record_primary(&self, context: &DeviceContext, image_index: u32, secondary: &[vk::CommandBuffer]) -> VulkanResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("No framebuffer for swapchain image {}", image_index)))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: context.swapchain().extent(),
        };

        let mut recorder = CommandRecorder::begin_primary(context.device().clone(), self.primary)?;
        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer.handle(),
                render_area,
                &clear_values,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
            pass.execute_commands(secondary);
        }
        recorder.end()?;
        Ok(())
    }

    fn submit(&self, context: &DeviceContext) -> VulkanResult<()> {
        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.primary];
        let signal_semaphores = [self.sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            context
                .device()
                .queue_submit(context.queues().graphics(), &[submit_info], vk::Fence::null())
        }
        .map_err(|err| {
            log::error!("Error while executing vkQueueSubmit: {:?}", err);
            VulkanError::Api(err)
        })
    }

    fn wait_queues_idle(&self, context: &DeviceContext) -> VulkanResult<()> {
        let device = context.device();
        let queues = context.queues();
        unsafe {
            device
                .queue_wait_idle(queues.graphics())
                .map_err(VulkanError::Api)?;
            if queues.presentation() != queues.graphics() {
                device
                    .queue_wait_idle(queues.presentation())
                    .map_err(VulkanError::Api)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::vulkan::geometry::GeometryId;

    #[test]
    fn test_group_by_shader_is_ordered_and_contiguous() {
        let first = ShaderId::next();
        let second = ShaderId::next();

        let groups = group_by_shader(vec![(second, "a"), (first, "b"), (second, "c")]);

        let flattened: Vec<_> = groups.iter().flat_map(|(_, items)| items.iter().copied()).collect();
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(flattened, vec!["b", "a", "c"]);
    }

    struct Recorded {
        signature: DrawSignature,
        recordings: usize,
    }

    impl CachedDraws for Recorded {
        fn signature(&self) -> &DrawSignature {
            &self.signature
        }

        fn set_signature(&mut self, signature: DrawSignature) {
            self.signature = signature;
        }
    }

    fn serve_frame(
        cache: &mut HashMap<ShaderId, Recorded>,
        records: Vec<(ShaderId, (GeometryId, Mat4))>,
        invalidate: bool,
    ) {
        for (shader_id, draws) in group_by_shader(records) {
            refresh_cached(
                cache,
                shader_id,
                DrawSignature::new(draws),
                invalidate,
                |signature| Ok::<_, ()>(Recorded { signature, recordings: 1 }),
                |entry| {
                    entry.recordings += 1;
                    Ok(())
                },
            )
            .unwrap();
        }
    }

    #[test]
    fn test_shared_shader_gets_one_cache_entry() {
        let shader = ShaderId::next();
        let cube = GeometryId::next();
        let plane = GeometryId::next();
        let records = vec![
            (shader, (cube, Mat4::identity())),
            (shader, (plane, Mat4::new_translation(&Vec3::x()))),
        ];

        let mut cache = HashMap::new();
        for _frame in 0..3 {
            serve_frame(&mut cache, records.clone(), true);
        }

        assert_eq!(cache.len(), 1);
        let entry = &cache[&shader];
        assert_eq!(entry.signature.len(), 2);
        assert_eq!(entry.recordings, 1);
    }

    #[test]
    fn test_moved_entity_rerecords_only_when_invalidating() {
        let shader = ShaderId::next();
        let cube = GeometryId::next();
        let before = vec![(shader, (cube, Mat4::identity()))];
        let after = vec![(shader, (cube, Mat4::new_translation(&Vec3::y())))];

        let mut frozen = HashMap::new();
        serve_frame(&mut frozen, before.clone(), false);
        serve_frame(&mut frozen, after.clone(), false);
        assert_eq!(frozen[&shader].recordings, 1);
        assert_eq!(frozen[&shader].signature, DrawSignature::new([(cube, Mat4::identity())]));

        let mut live = HashMap::new();
        serve_frame(&mut live, before, true);
        serve_frame(&mut live, after.clone(), true);
        serve_frame(&mut live, after, true);
        assert_eq!(live[&shader].recordings, 2);
        assert_eq!(
            live[&shader].signature,
            DrawSignature::new([(cube, Mat4::new_translation(&Vec3::y()))])
        );
    }

    #[test]
    fn test_failed_recording_leaves_no_entry() {
        let shader = ShaderId::next();
        let signature = DrawSignature::new([(GeometryId::next(), Mat4::identity())]);
        let mut cache: HashMap<ShaderId, Recorded> = HashMap::new();

        let result = refresh_cached(&mut cache, shader, signature, true, |_| Err("no pool"), |_| Ok(()));

        assert!(matches!(result, Err("no pool")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_action() {
        let geometry = GeometryId::next();
        let before = DrawSignature::new([(geometry, Mat4::identity())]);
        let after = DrawSignature::new([(geometry, Mat4::new_scaling(2.0))]);

        assert_eq!(cache_action(None, &before, true), CacheAction::Record);
        assert_eq!(cache_action(Some(&before), &before, true), CacheAction::Reuse);
        assert_eq!(cache_action(Some(&before), &after, true), CacheAction::Rerecord);
        assert_eq!(cache_action(Some(&before), &after, false), CacheAction::Reuse);
    }
}
