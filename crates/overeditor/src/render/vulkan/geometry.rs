//! Indexed geometry in host-visible memory

use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;

use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::layout::VertexLayout;
use crate::render::vulkan::{VulkanError, VulkanResult};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique geometry identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeometryId(u64);

impl GeometryId {
    pub(crate) fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Expected vertex byte length for `vertex_count` vertices of `layout`
fn check_vertex_bytes(layout: &VertexLayout, vertex_bytes: &[u8], vertex_count: u32) -> VulkanResult<u64> {
    let expected = u64::from(vertex_count) * u64::from(layout.stride());
    if vertex_bytes.len() as u64 != expected {
        return Err(VulkanError::invalid(format!(
            "Vertex data is {} bytes but {} vertices of stride {} need {}",
            vertex_bytes.len(),
            vertex_count,
            layout.stride(),
            expected
        )));
    }
    if expected == 0 {
        return Err(VulkanError::invalid("Geometry without vertex data"));
    }
    Ok(expected)
}

/// Vertex and 16-bit index buffers of one mesh
pub struct GeometryBuffer {
    id: GeometryId,
    vertex: Buffer,
    index: Buffer,
    vertex_count: u32,
    index_count: u32,
    layout: VertexLayout,
}

impl GeometryBuffer {
    /// Upload interleaved `vertex_bytes` and `indices`
    pub fn new(
        context: &DeviceContext,
        layout: VertexLayout,
        vertex_bytes: &[u8],
        vertex_count: u32,
        indices: &[u16],
    ) -> VulkanResult<Self> {
        let vertex_size = check_vertex_bytes(&layout, vertex_bytes, vertex_count)?;
        if indices.is_empty() {
            return Err(VulkanError::invalid("Geometry without indices"));
        }
        if let Some(index) = indices.iter().find(|index| u32::from(**index) >= vertex_count) {
            return Err(VulkanError::invalid(format!(
                "Index {} out of range for {} vertices",
                index, vertex_count
            )));
        }

        let mut vertex = Buffer::host_visible(context, vertex_size, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        vertex.write_bytes(vertex_bytes)?;

        let index_size = std::mem::size_of_val(indices) as vk::DeviceSize;
        let mut index = Buffer::host_visible(context, index_size, vk::BufferUsageFlags::INDEX_BUFFER)?;
        index.write(indices)?;

        let id = GeometryId::next();
        log::debug!(
            "Uploaded geometry {:?}: {} vertices, {} indices",
            id,
            vertex_count,
            indices.len()
        );

        Ok(Self {
            id,
            vertex,
            index,
            vertex_count,
            index_count: indices.len() as u32,
            layout,
        })
    }

    /// Upload typed vertices, e.g. a `#[repr(C)]` `Pod` struct per vertex
    pub fn from_vertices<V: bytemuck::Pod>(
        context: &DeviceContext,
        layout: VertexLayout,
        vertices: &[V],
        indices: &[u16],
    ) -> VulkanResult<Self> {
        Self::new(
            context,
            layout,
            bytemuck::cast_slice(vertices),
            vertices.len() as u32,
            indices,
        )
    }

    /// Release both buffers now
    pub fn dispose(self) {}

    /// Process-unique identity
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex.handle()
    }

    /// Index buffer handle
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index.handle()
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Layout of one vertex
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::layout::VertexElement;

    fn position_color() -> VertexLayout {
        VertexLayout::new(vec![VertexElement::floats(3), VertexElement::floats(3)])
    }

    #[test]
    fn test_vertex_bytes_must_match_stride() {
        let layout = position_color();
        let bytes = vec![0u8; 24 * 3];

        assert_eq!(check_vertex_bytes(&layout, &bytes, 3).ok(), Some(72));
        assert!(matches!(
            check_vertex_bytes(&layout, &bytes, 4),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(check_vertex_bytes(&layout, &[], 0).is_err());
    }

    #[test]
    fn test_geometry_ids_are_unique() {
        assert_ne!(GeometryId::next(), GeometryId::next());
    }
}
