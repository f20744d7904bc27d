//! Memory layout model
//!
//! Pure value types describing how bytes are laid out in descriptors, vertex
//! streams and push constants, plus their conversion into the Vulkan
//! structures the pipeline and descriptor code consume. Nothing here touches
//! a device, so every conversion is testable on its own.

use std::collections::BTreeMap;

use ash::vk;

/// `count` items of `length` bytes each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutElement {
    length: u8,
    count: u8,
}

impl LayoutElement {
    /// Create a new element
    pub const fn new(length: u8, count: u8) -> Self {
        Self { length, count }
    }

    /// Byte length of a single item
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Number of items
    pub fn count(&self) -> u8 {
        self.count
    }

    /// Total bytes covered by this element
    pub fn size(&self) -> u32 {
        u32::from(self.length) * u32::from(self.count)
    }
}

/// Anything that can be laid out in a [`Layout`]
pub trait Element {
    /// Underlying length × count description
    fn layout(&self) -> &LayoutElement;

    /// Total bytes covered by this element
    fn size(&self) -> u32 {
        self.layout().size()
    }
}

/// Element bound through a descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorElement {
    layout: LayoutElement,
    ty: vk::DescriptorType,
    imported: bool,
}

impl DescriptorElement {
    /// Element backed by a buffer the descriptors controller allocates
    pub const fn new(length: u8, count: u8, ty: vk::DescriptorType) -> Self {
        Self {
            layout: LayoutElement::new(length, count),
            ty,
            imported: false,
        }
    }

    /// Element whose resource is owned elsewhere, e.g. the camera matrices
    pub const fn imported(length: u8, count: u8, ty: vk::DescriptorType) -> Self {
        Self {
            layout: LayoutElement::new(length, count),
            ty,
            imported: true,
        }
    }

    /// Uniform buffer element with a private backing buffer
    pub const fn uniform(length: u8, count: u8) -> Self {
        Self::new(length, count, vk::DescriptorType::UNIFORM_BUFFER)
    }

    /// Descriptor type used in set layouts and pool sizes
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        self.ty
    }

    /// Whether the bound resource is provided from outside
    pub fn is_imported(&self) -> bool {
        self.imported
    }
}

impl Element for DescriptorElement {
    fn layout(&self) -> &LayoutElement {
        &self.layout
    }
}

/// Attribute inside an interleaved vertex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    layout: LayoutElement,
    format: vk::Format,
}

impl VertexElement {
    /// Create a new vertex attribute
    pub const fn new(length: u8, count: u8, format: vk::Format) -> Self {
        Self {
            layout: LayoutElement::new(length, count),
            format,
        }
    }

    /// `count` 32-bit floats
    pub const fn floats(count: u8) -> Self {
        let format = match count {
            1 => vk::Format::R32_SFLOAT,
            2 => vk::Format::R32G32_SFLOAT,
            3 => vk::Format::R32G32B32_SFLOAT,
            _ => vk::Format::R32G32B32A32_SFLOAT,
        };
        Self::new(4, count, format)
    }

    /// Attribute format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Element for VertexElement {
    fn layout(&self) -> &LayoutElement {
        &self.layout
    }
}

/// Block of push constant data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantElement {
    layout: LayoutElement,
}

impl PushConstantElement {
    /// Create a new push constant block
    pub const fn new(length: u8, count: u8) -> Self {
        Self {
            layout: LayoutElement::new(length, count),
        }
    }

    /// A single column-major 4x4 float matrix
    pub const fn matrix() -> Self {
        Self::new(64, 1)
    }
}

impl Element for PushConstantElement {
    fn layout(&self) -> &LayoutElement {
        &self.layout
    }
}

/// Ordered list of elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout<E> {
    elements: Vec<E>,
}

impl<E> Default for Layout<E> {
    fn default() -> Self {
        Self { elements: Vec::new() }
    }
}

impl<E: Element> Layout<E> {
    /// Create a layout from its elements
    pub fn new(elements: Vec<E>) -> Self {
        Self { elements }
    }

    /// Elements in declaration order
    pub fn elements(&self) -> &[E] {
        &self.elements
    }

    /// Whether the layout declares nothing
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sum of every element's size
    pub fn stride(&self) -> u32 {
        self.elements.iter().map(Element::size).sum()
    }
}

impl<E: Element> FromIterator<E> for Layout<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Layout of a single descriptor set
pub type DescriptorLayout = Layout<DescriptorElement>;
/// Layout of an interleaved vertex stream
pub type VertexLayout = Layout<VertexElement>;
/// Layout of a stage's push constants
pub type PushConstantsLayout = Layout<PushConstantElement>;

impl DescriptorLayout {
    /// One binding per element: binding index = position, count = element count
    pub fn bindings(&self, stage: vk::ShaderStageFlags) -> Vec<vk::DescriptorSetLayoutBinding> {
        (0u32..)
            .zip(&self.elements)
            .map(|(binding, element)| {
                log::debug!(
                    "Adding binding at position {} ({:?}({}) x {})",
                    binding,
                    element.ty,
                    element.layout.length(),
                    element.layout.count()
                );
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(element.ty)
                    .descriptor_count(u32::from(element.layout.count()))
                    .stage_flags(stage)
                    .build()
            })
            .collect()
    }
}

/// Pool sizes covering every element of every layout, grouped by descriptor type
///
/// Imported elements are included; they still occupy a slot in the set.
pub fn pool_sizes<'a>(layouts: impl IntoIterator<Item = &'a DescriptorLayout>) -> Vec<vk::DescriptorPoolSize> {
    let mut totals: BTreeMap<i32, u32> = BTreeMap::new();
    for element in layouts.into_iter().flat_map(|layout| layout.elements()) {
        *totals.entry(element.ty.as_raw()).or_default() += u32::from(element.layout.count());
    }
    totals
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty: vk::DescriptorType::from_raw(ty),
            descriptor_count,
        })
        .collect()
}

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

/// Push constant ranges for both stages, vertex first
///
/// Each stage gets at most one range covering all of its elements. Stage
/// blocks run sequentially and every offset and size is a multiple of four.
/// A stage whose elements are all zero-sized produces no range.
pub fn push_constant_ranges(
    vertex: &PushConstantsLayout,
    fragment: &PushConstantsLayout,
) -> Vec<vk::PushConstantRange> {
    let stages = [
        (vk::ShaderStageFlags::VERTEX, vertex),
        (vk::ShaderStageFlags::FRAGMENT, fragment),
    ];

    let mut offset = 0;
    let mut ranges = Vec::new();
    for (stage, layout) in stages {
        let size: u32 = layout.elements().iter().map(|element| align4(element.size())).sum();
        if size == 0 {
            continue;
        }
        ranges.push(vk::PushConstantRange {
            stage_flags: stage,
            offset,
            size,
        });
        offset += size;
    }
    ranges
}

impl VertexLayout {
    /// Single per-vertex binding at index 0
    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// One attribute per element at sequential locations and offsets
    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        let mut offset = 0;
        (0u32..)
            .zip(&self.elements)
            .map(|(location, element)| {
                let description = vk::VertexInputAttributeDescription {
                    location,
                    binding: 0,
                    format: element.format,
                    offset,
                };
                offset += element.size();
                description
            })
            .collect()
    }
}
