//! Descriptor set layouts, pools and per-shader uniform allocation
//!
//! [`DescriptorAllocationPlan`] works out, without a device, which buffers a
//! shader's descriptor layouts need and how large the pool must be.
//! [`DescriptorsController`] realizes a plan: it owns the pool, the sets drawn
//! from it and the private uniform buffers, and writes the bindings.

use ash::{vk, Device};

use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::layout::{self, DescriptorElement, DescriptorLayout, Element};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Create a set layout from its bindings
    pub fn new(device: Device, bindings: Vec<vk::DescriptorSetLayoutBinding>) -> VulkanResult<Self> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { layout, device })
    }

    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool holding exactly `pool_sizes` descriptors across `max_sets` sets
    pub fn new(device: Device, pool_sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { pool, device })
    }

    /// Allocate one set per layout
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// One descriptor slot: a binding of a set and the element it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedSlot {
    /// Index of the set, in layout order
    pub set: usize,
    /// Binding index inside the set
    pub binding: u32,
    /// Element bound at this slot
    pub element: DescriptorElement,
    /// Index into the planned buffers, `None` for imported elements
    pub buffer: Option<usize>,
}

/// Private buffer required by a non-imported element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBuffer {
    /// Index of the set, in layout order
    pub set: usize,
    /// Binding index inside the set
    pub binding: u32,
    /// Buffer size in bytes
    pub size: vk::DeviceSize,
    /// Distance in bytes between consecutive array items
    pub stride: vk::DeviceSize,
    /// Buffer usage derived from the descriptor type
    pub usage: vk::BufferUsageFlags,
}

/// Everything a [`DescriptorsController`] will allocate for a list of layouts
#[derive(Debug, Clone, Default)]
pub struct DescriptorAllocationPlan {
    slots: Vec<PlannedSlot>,
    buffers: Vec<PlannedBuffer>,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    uniform_alignment: vk::DeviceSize,
    storage_alignment: vk::DeviceSize,
}

fn usage_for(ty: vk::DescriptorType) -> vk::BufferUsageFlags {
    match ty {
        vk::DescriptorType::STORAGE_BUFFER | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => {
            vk::BufferUsageFlags::STORAGE_BUFFER
        }
        _ => vk::BufferUsageFlags::UNIFORM_BUFFER,
    }
}

/// `length` rounded up to a multiple of `alignment`
fn aligned(length: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    let alignment = alignment.max(1);
    length.div_ceil(alignment) * alignment
}

impl DescriptorAllocationPlan {
    /// Plan slots, buffers and pool sizing for `layouts`, one set per layout
    ///
    /// Array items are spaced by their length rounded up to the device's
    /// minimum offset alignment for the descriptor type.
    pub fn for_layouts(layouts: &[&DescriptorLayout], limits: &vk::PhysicalDeviceLimits) -> Self {
        let mut plan = Self {
            uniform_alignment: limits.min_uniform_buffer_offset_alignment.max(1),
            storage_alignment: limits.min_storage_buffer_offset_alignment.max(1),
            ..Self::default()
        };

        let mut slots = Vec::new();
        let mut buffers = Vec::new();

        for (set, layout) in layouts.iter().enumerate() {
            for (binding, element) in (0u32..).zip(layout.elements()) {
                let buffer = if element.is_imported() {
                    None
                } else {
                    buffers.push(PlannedBuffer {
                        set,
                        binding,
                        size: plan.span_for(element),
                        stride: plan.stride_for(element),
                        usage: usage_for(element.descriptor_type()),
                    });
                    Some(buffers.len() - 1)
                };
                slots.push(PlannedSlot {
                    set,
                    binding,
                    element: *element,
                    buffer,
                });
            }
        }

        plan.slots = slots;
        plan.buffers = buffers;
        plan.pool_sizes = layout::pool_sizes(layouts.iter().copied());
        plan.max_sets = layouts.len() as u32;
        plan
    }

    /// Distance between array items of `element` in its buffer
    pub fn stride_for(&self, element: &DescriptorElement) -> vk::DeviceSize {
        let alignment = if usage_for(element.descriptor_type()) == vk::BufferUsageFlags::STORAGE_BUFFER {
            self.storage_alignment
        } else {
            self.uniform_alignment
        };
        aligned(vk::DeviceSize::from(element.layout().length()), alignment)
    }

    /// Bytes `element` occupies in a buffer: every item but the last padded to the stride
    pub fn span_for(&self, element: &DescriptorElement) -> vk::DeviceSize {
        let count = vk::DeviceSize::from(element.layout().count());
        self.stride_for(element) * count.saturating_sub(1) + vk::DeviceSize::from(element.layout().length())
    }

    /// Every descriptor slot in set, then binding order
    pub fn slots(&self) -> &[PlannedSlot] {
        &self.slots
    }

    /// Private buffers in declaration order
    pub fn buffers(&self) -> &[PlannedBuffer] {
        &self.buffers
    }

    /// Pool sizes covering every slot, imported ones included
    pub fn pool_sizes(&self) -> &[vk::DescriptorPoolSize] {
        &self.pool_sizes
    }

    /// Number of sets the pool must hold
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Whether there is nothing to allocate
    pub fn is_empty(&self) -> bool {
        self.max_sets == 0
    }
}

/// Buffer infos for one slot: item `i` of the array reads `length` bytes at `i * stride`
fn buffer_infos(
    buffer: vk::Buffer,
    element: &DescriptorElement,
    stride: vk::DeviceSize,
) -> Vec<vk::DescriptorBufferInfo> {
    let length = vk::DeviceSize::from(element.layout().length());
    (0..vk::DeviceSize::from(element.layout().count()))
        .map(|index| vk::DescriptorBufferInfo {
            buffer,
            offset: index * stride,
            range: length,
        })
        .collect()
}

/// Descriptor pool, its sets and the private buffers of one (camera, shader) pairing
pub struct DescriptorsController {
    device: Option<Device>,
    plan: DescriptorAllocationPlan,
    sets: Vec<vk::DescriptorSet>,
    pool: Option<DescriptorPool>,
    buffers: Vec<Buffer>,
}

impl DescriptorsController {
    /// Allocate buffers, pool and sets for `layouts`
    ///
    /// `set_layouts` must hold the created handle of every entry of `layouts`,
    /// in the same order. No layouts yields an empty controller without a pool.
    pub fn create_for(
        context: &DeviceContext,
        layouts: &[&DescriptorLayout],
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        if layouts.len() != set_layouts.len() {
            return Err(VulkanError::invalid(format!(
                "{} descriptor layouts but {} set layout handles",
                layouts.len(),
                set_layouts.len()
            )));
        }

        let plan = DescriptorAllocationPlan::for_layouts(layouts, context.limits());
        if plan.is_empty() {
            return Ok(Self::empty());
        }

        let buffers = plan
            .buffers()
            .iter()
            .map(|planned| Buffer::host_visible(context, planned.size, planned.usage))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Descriptor pool: {} set(s), {} pool size(s), {} private buffer(s)",
            plan.max_sets(),
            plan.pool_sizes().len(),
            buffers.len()
        );

        let device = context.device().clone();
        let pool = DescriptorPool::new(device.clone(), plan.pool_sizes(), plan.max_sets())?;
        let sets = pool.allocate_descriptor_sets(set_layouts)?;

        Ok(Self {
            device: Some(device),
            plan,
            sets,
            pool: Some(pool),
            buffers,
        })
    }

    /// Controller for a shader without descriptors
    pub fn empty() -> Self {
        Self {
            device: None,
            plan: DescriptorAllocationPlan::default(),
            sets: Vec::new(),
            pool: None,
            buffers: Vec::new(),
        }
    }

    /// Point every uniform buffer binding at its buffer
    ///
    /// Imported elements bind to `imported`; the others to their private buffer.
    /// Non-buffer descriptor types are left for the caller.
    pub fn write_bindings(&self, imported: Option<&Buffer>) -> VulkanResult<()> {
        let Some(device) = &self.device else {
            return Ok(());
        };

        let mut targets = Vec::new();
        for slot in self.plan.slots() {
            if slot.element.descriptor_type() != vk::DescriptorType::UNIFORM_BUFFER {
                log::debug!(
                    "Skipping binding {} of set {}: {:?} is not a uniform buffer",
                    slot.binding,
                    slot.set,
                    slot.element.descriptor_type()
                );
                continue;
            }

            let buffer = match slot.buffer {
                Some(index) => self
                    .buffers
                    .get(index)
                    .ok_or_else(|| VulkanError::invalid("Descriptor buffer missing"))?,
                None => imported.ok_or_else(|| {
                    VulkanError::invalid(format!(
                        "Binding {} of set {} is imported but no buffer was provided",
                        slot.binding, slot.set
                    ))
                })?,
            };
            let span = self.plan.span_for(&slot.element);
            if buffer.size() < span {
                return Err(VulkanError::invalid(format!(
                    "Buffer of {} bytes is too small for binding {} of set {} ({} bytes)",
                    buffer.size(),
                    slot.binding,
                    slot.set,
                    span
                )));
            }
            let set = *self
                .sets
                .get(slot.set)
                .ok_or_else(|| VulkanError::invalid("Descriptor set missing"))?;

            let stride = self.plan.stride_for(&slot.element);
            targets.push((set, slot.binding, buffer_infos(buffer.handle(), &slot.element, stride)));
        }

        let writes: Vec<vk::WriteDescriptorSet> = targets
            .iter()
            .map(|(set, binding, infos)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(infos)
                    .build()
            })
            .collect();

        if !writes.is_empty() {
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(())
    }

    /// Descriptor sets in layout order
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    /// Private buffers in declaration order
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Allocation this controller was built from
    pub fn plan(&self) -> &DescriptorAllocationPlan {
        &self.plan
    }

    /// Whether a pool was created
    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn limits(alignment: vk::DeviceSize) -> vk::PhysicalDeviceLimits {
        vk::PhysicalDeviceLimits {
            min_uniform_buffer_offset_alignment: alignment,
            min_storage_buffer_offset_alignment: alignment,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_vertex_uniform() {
        let vertex = DescriptorLayout::new(vec![DescriptorElement::uniform(64, 1)]);
        let plan = DescriptorAllocationPlan::for_layouts(&[&vertex], &limits(256));

        let bindings = vertex.bindings(vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 0);

        assert_eq!(plan.max_sets(), 1);
        assert_eq!(plan.buffers().len(), 1);
        assert_eq!(plan.buffers()[0].size, 64);
        assert_eq!(plan.buffers()[0].usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert_eq!(plan.pool_sizes().len(), 1);
        assert_eq!(plan.pool_sizes()[0].descriptor_count, 1);
    }

    #[test]
    fn test_imported_elements_get_no_buffer() {
        let vertex = DescriptorLayout::new(vec![
            DescriptorElement::imported(128, 1, vk::DescriptorType::UNIFORM_BUFFER),
            DescriptorElement::uniform(16, 1),
        ]);
        let fragment = DescriptorLayout::new(vec![
            DescriptorElement::uniform(32, 1),
            DescriptorElement::imported(64, 1, vk::DescriptorType::UNIFORM_BUFFER),
        ]);

        let plan = DescriptorAllocationPlan::for_layouts(&[&vertex, &fragment], &limits(256));

        // N = 4 elements, K = 2 imported
        assert_eq!(plan.buffers().len(), 2);
        assert_eq!(plan.slots().len(), 4);
        let total: u32 = plan.pool_sizes().iter().map(|size| size.descriptor_count).sum();
        assert_eq!(total, 4);
        assert_eq!(plan.max_sets(), 2);

        let sizes: Vec<_> = plan.buffers().iter().map(|buffer| (buffer.set, buffer.binding, buffer.size)).collect();
        assert_eq!(sizes, vec![(0, 1, 16), (1, 0, 32)]);
        assert_eq!(plan.slots()[0].buffer, None);
        assert_eq!(plan.slots()[1].buffer, Some(0));
        assert_eq!(plan.slots()[2].buffer, Some(1));
    }

    #[test]
    fn test_array_element_sizes_buffer_for_every_item() {
        let layout = DescriptorLayout::new(vec![DescriptorElement::uniform(16, 4)]);
        let plan = DescriptorAllocationPlan::for_layouts(&[&layout], &limits(1));

        assert_eq!(plan.buffers()[0].size, 64);
        assert_eq!(plan.pool_sizes()[0].descriptor_count, 4);
    }

    #[test]
    fn test_array_items_respect_offset_alignment() {
        let layout = DescriptorLayout::new(vec![DescriptorElement::uniform(16, 4)]);
        let plan = DescriptorAllocationPlan::for_layouts(&[&layout], &limits(256));

        let planned = plan.buffers()[0];
        assert_eq!(planned.stride, 256);
        assert_eq!(planned.size, 3 * 256 + 16);

        let infos = buffer_infos(vk::Buffer::from_raw(1), &plan.slots()[0].element, planned.stride);
        let offsets: Vec<_> = infos.iter().map(|info| info.offset).collect();
        assert_eq!(offsets, vec![0, 256, 512, 768]);
        assert!(infos.iter().all(|info| info.offset % 256 == 0 && info.range == 16));
        assert!(infos.iter().all(|info| info.offset + info.range <= planned.size));
    }

    #[test]
    fn test_zero_alignment_limit_packs_items() {
        let layout = DescriptorLayout::new(vec![DescriptorElement::uniform(16, 2)]);
        let plan = DescriptorAllocationPlan::for_layouts(&[&layout], &limits(0));

        assert_eq!(plan.buffers()[0].stride, 16);
        assert_eq!(plan.buffers()[0].size, 32);
    }

    #[test]
    fn test_storage_buffers_use_storage_usage() {
        let layout = DescriptorLayout::new(vec![DescriptorElement::new(4, 8, vk::DescriptorType::STORAGE_BUFFER)]);
        let plan = DescriptorAllocationPlan::for_layouts(&[&layout], &limits(1));

        assert_eq!(plan.buffers()[0].usage, vk::BufferUsageFlags::STORAGE_BUFFER);
    }

    #[test]
    fn test_no_layouts_is_empty() {
        let plan = DescriptorAllocationPlan::for_layouts(&[], &limits(1));
        assert!(plan.is_empty());
        assert!(plan.pool_sizes().is_empty());

        let controller = DescriptorsController::empty();
        assert!(!controller.has_pool());
        assert!(controller.sets().is_empty());
        assert!(controller.write_bindings(None).is_ok());
    }
}
