//! Shader management
//!
//! SPIR-V loading, module wrappers and the graphics pipeline built for a pair
//! of vertex and fragment sources.

use std::ffi::CStr;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::{vk, Device};

use crate::render::vulkan::descriptors::DescriptorSetLayout;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::layout::{self, DescriptorLayout, PushConstantsLayout, VertexLayout};
use crate::render::vulkan::{VulkanError, VulkanResult};

// SAFETY: the literal is nul terminated and has no interior nul.
const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Size of the model matrix pushed per drawable
pub const MODEL_MATRIX_SIZE: u32 = 64;

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique shader identity, used as the drawing cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderId(u64);

impl ShaderId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// SPIR-V bytecode of one stage plus the layouts it declares
#[derive(Debug, Clone, Default)]
pub struct ShaderSource {
    bytes: Vec<u8>,
    descriptor_layouts: Vec<DescriptorLayout>,
    vertex_layout: VertexLayout,
    push_constants: PushConstantsLayout,
}

impl ShaderSource {
    /// Source from bytecode already in memory
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }

    /// Read a `.spv` file fully
    pub fn from_file<P: AsRef<Path>>(path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(bytes))
    }

    /// Descriptor set layouts, one set per entry
    pub fn with_descriptors(mut self, layouts: Vec<DescriptorLayout>) -> Self {
        self.descriptor_layouts = layouts;
        self
    }

    /// Vertex input layout, only read from the vertex stage
    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Push constant blocks of this stage
    pub fn with_push_constants(mut self, layout: PushConstantsLayout) -> Self {
        self.push_constants = layout;
        self
    }

    /// Raw SPIR-V
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Declared descriptor layouts
    pub fn descriptor_layouts(&self) -> &[DescriptorLayout] {
        &self.descriptor_layouts
    }

    /// Declared vertex layout
    pub fn vertex_layout(&self) -> &VertexLayout {
        &self.vertex_layout
    }

    /// Declared push constants
    pub fn push_constants(&self) -> &PushConstantsLayout {
        &self.push_constants
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        // SPIR-V is a stream of u32 words
        let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() || words.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "SPIR-V bytecode is empty or not properly aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create the pipeline layout and a fixed-function graphics pipeline
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        vertex_layout: &VertexLayout,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = if vertex_layout.is_empty() {
            Vec::new()
        } else {
            vec![vertex_layout.binding_description()]
        };
        let attributes = vertex_layout.attribute_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build()];
        let scissors = [vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match created.map(|pipelines| pipelines.into_iter().next()) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::InitializationFailed(
                    "vkCreateGraphicsPipelines returned no pipeline".to_string(),
                ));
            }
            Err((_, err)) => {
                log::error!("Error while executing vkCreateGraphicsPipelines: {:?}", err);
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Vertex + fragment program and the pipeline built from them
///
/// Drawables share a shader through `Arc<Shader>`. Resources are released in
/// reverse construction order: pipeline and its layout, set layouts, modules.
pub struct Shader {
    id: ShaderId,
    pipeline: GraphicsPipeline,
    set_layouts: Vec<DescriptorSetLayout>,
    fragment_module: ShaderModule,
    vertex_module: ShaderModule,
    vertex: ShaderSource,
    fragment: ShaderSource,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Shader {
    /// Build modules, set layouts and the graphics pipeline for `render_pass`
    pub fn new(
        context: &DeviceContext,
        render_pass: vk::RenderPass,
        vertex: ShaderSource,
        fragment: ShaderSource,
    ) -> VulkanResult<Self> {
        let device = context.device();

        let vertex_module = ShaderModule::from_bytes(device.clone(), vertex.bytes())?;
        let fragment_module = ShaderModule::from_bytes(device.clone(), fragment.bytes())?;

        let set_layouts = Self::stage_layouts(&vertex, &fragment)
            .map(|(stage, layout)| DescriptorSetLayout::new(device.clone(), layout.bindings(stage)))
            .collect::<VulkanResult<Vec<_>>>()?;
        let set_layout_handles: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(DescriptorSetLayout::handle).collect();

        let push_constant_ranges = layout::push_constant_ranges(vertex.push_constants(), fragment.push_constants());

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass,
            &vertex_module,
            &fragment_module,
            vertex.vertex_layout(),
            &set_layout_handles,
            &push_constant_ranges,
            context.swapchain().extent(),
        )?;

        let id = ShaderId::next();
        log::info!(
            "Created shader {:?}: {} descriptor set(s), {} push constant range(s), vertex stride {}",
            id,
            set_layouts.len(),
            push_constant_ranges.len(),
            vertex.vertex_layout().stride()
        );

        Ok(Self {
            id,
            pipeline,
            set_layouts,
            fragment_module,
            vertex_module,
            vertex,
            fragment,
            push_constant_ranges,
        })
    }

    fn stage_layouts<'a>(
        vertex: &'a ShaderSource,
        fragment: &'a ShaderSource,
    ) -> impl Iterator<Item = (vk::ShaderStageFlags, &'a DescriptorLayout)> {
        let vertex_layouts = vertex
            .descriptor_layouts()
            .iter()
            .map(|layout| (vk::ShaderStageFlags::VERTEX, layout));
        let fragment_layouts = fragment
            .descriptor_layouts()
            .iter()
            .map(|layout| (vk::ShaderStageFlags::FRAGMENT, layout));
        vertex_layouts.chain(fragment_layouts)
    }

    /// Process-unique identity
    pub fn id(&self) -> ShaderId {
        self.id
    }

    /// Pipeline handle
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// Pipeline layout handle
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }

    /// Descriptor layouts, vertex stage first then fragment
    pub fn descriptor_layouts(&self) -> Vec<&DescriptorLayout> {
        Self::stage_layouts(&self.vertex, &self.fragment)
            .map(|(_, layout)| layout)
            .collect()
    }

    /// Set layout handles in the same order as [`Shader::descriptor_layouts`]
    pub fn set_layout_handles(&self) -> Vec<vk::DescriptorSetLayout> {
        self.set_layouts.iter().map(DescriptorSetLayout::handle).collect()
    }

    /// Vertex input layout of the vertex stage
    pub fn vertex_layout(&self) -> &VertexLayout {
        self.vertex.vertex_layout()
    }

    /// All push constant ranges in pipeline layout order
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Range receiving the per-drawable model matrix, if the vertex stage declares one
    pub fn model_push_range(&self) -> Option<vk::PushConstantRange> {
        model_push_range(&self.push_constant_ranges)
    }

    /// Module handles, vertex then fragment
    pub fn modules(&self) -> (vk::ShaderModule, vk::ShaderModule) {
        (self.vertex_module.handle(), self.fragment_module.handle())
    }
}

fn model_push_range(ranges: &[vk::PushConstantRange]) -> Option<vk::PushConstantRange> {
    ranges
        .iter()
        .find(|range| range.stage_flags.contains(vk::ShaderStageFlags::VERTEX) && range.size >= MODEL_MATRIX_SIZE)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::layout::{DescriptorElement, PushConstantElement};

    #[test]
    fn test_shader_ids_are_unique() {
        let first = ShaderId::next();
        let second = ShaderId::next();
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = ShaderSource::from_file("does/not/exist.spv");
        match result {
            Err(VulkanError::ShaderLoad { path, .. }) => assert!(path.ends_with("exist.spv")),
            other => panic!("unexpected result: {:?}", other.map(|source| source.bytes().len())),
        }
    }

    #[test]
    fn test_stage_layouts_vertex_first() {
        let vertex = ShaderSource::new(Vec::new())
            .with_descriptors(vec![DescriptorLayout::new(vec![DescriptorElement::uniform(64, 1)])]);
        let fragment = ShaderSource::new(Vec::new()).with_descriptors(vec![
            DescriptorLayout::new(vec![DescriptorElement::uniform(16, 1)]),
            DescriptorLayout::new(vec![DescriptorElement::uniform(4, 1)]),
        ]);

        let stages: Vec<_> = Shader::stage_layouts(&vertex, &fragment)
            .map(|(stage, layout)| (stage, layout.stride()))
            .collect();

        assert_eq!(
            stages,
            vec![
                (vk::ShaderStageFlags::VERTEX, 64),
                (vk::ShaderStageFlags::FRAGMENT, 16),
                (vk::ShaderStageFlags::FRAGMENT, 4),
            ]
        );
    }

    #[test]
    fn test_model_push_range_requires_vertex_matrix() {
        let vertex = PushConstantsLayout::new(vec![PushConstantElement::matrix()]);
        let fragment = PushConstantsLayout::new(vec![PushConstantElement::new(16, 1)]);

        let ranges = layout::push_constant_ranges(&vertex, &fragment);
        let range = model_push_range(&ranges).map(|range| (range.offset, range.size));
        assert_eq!(range, Some((0, 64)));

        let fragment_only = layout::push_constant_ranges(&PushConstantsLayout::default(), &vertex);
        assert!(model_push_range(&fragment_only).is_none());
    }
}
