//! Queue family resolution
//!
//! Each queue role probes every family of a device once and keeps the first
//! family that satisfies it. Roles are independent: graphics and presentation
//! may resolve to the same family or to two different ones.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// What a queue family is needed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Family must expose the graphics flag bit
    Graphics,
    /// Family must be able to present to the target surface
    Presentation,
}

impl QueueRole {
    /// Whether `family` can serve this role
    pub fn accepts(self, family: &QueueFamilyInfo) -> bool {
        match self {
            Self::Graphics => family.flags.contains(vk::QueueFlags::GRAPHICS),
            Self::Presentation => family.presentation_supported,
        }
    }

    /// Display name used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Presentation => "presentation",
        }
    }
}

/// Snapshot of one queue family as reported by a physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    /// Capability flags
    pub flags: vk::QueueFlags,
    /// Number of queues in the family
    pub queue_count: u32,
    /// Result of the surface support query for this family
    pub presentation_supported: bool,
}

/// A role together with the family index it resolved to, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    role: QueueRole,
    index: Option<u32>,
}

impl QueueFamily {
    /// Unresolved family for `role`
    pub const fn new(role: QueueRole) -> Self {
        Self { role, index: None }
    }

    /// Offer a family; returns true when it was accepted.
    ///
    /// Once an index is set, every later offer is rejected.
    pub fn offer(&mut self, index: u32, family: &QueueFamilyInfo) -> bool {
        if self.index.is_some() || !self.role.accepts(family) {
            return false;
        }
        self.index = Some(index);
        true
    }

    /// Role this family resolves
    pub fn role(&self) -> QueueRole {
        self.role
    }

    /// Resolved index, if any
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Resolved index, or an error naming the role
    pub fn get(&self) -> VulkanResult<u32> {
        self.index.ok_or_else(|| {
            VulkanError::invalid(format!("Unable to get index of {} queue family", self.role.name()))
        })
    }
}

/// Resolved queue families for one physical device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    families: Vec<QueueFamily>,
}

impl QueueFamilyIndices {
    /// Unresolved graphics and presentation roles
    pub fn new() -> Self {
        Self {
            families: vec![
                QueueFamily::new(QueueRole::Graphics),
                QueueFamily::new(QueueRole::Presentation),
            ],
        }
    }

    /// Offer every family, in index order
    pub fn resolve(families: &[QueueFamilyInfo]) -> Self {
        let mut indices = Self::new();
        for (index, family) in (0u32..).zip(families) {
            indices.offer(index, family);
        }
        indices
    }

    /// Offer one family to every role
    pub fn offer(&mut self, index: u32, family: &QueueFamilyInfo) {
        for role in &mut self.families {
            if role.offer(index, family) {
                log::trace!("Queue family {} accepted as {}", index, role.role().name());
            }
        }
    }

    /// Resolved family of a role
    pub fn family(&self, role: QueueRole) -> Option<&QueueFamily> {
        self.families.iter().find(|family| family.role() == role)
    }

    /// Graphics family index
    pub fn graphics(&self) -> Option<u32> {
        self.family(QueueRole::Graphics).and_then(QueueFamily::index)
    }

    /// Presentation family index
    pub fn presentation(&self) -> Option<u32> {
        self.family(QueueRole::Presentation).and_then(QueueFamily::index)
    }

    /// Whether every role resolved
    pub fn is_complete(&self) -> bool {
        self.families.iter().all(|family| family.index().is_some())
    }

    /// Distinct resolved indices, ascending
    pub fn unique_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.families.iter().filter_map(QueueFamily::index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl Default for QueueFamilyIndices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, presentation_supported: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            presentation_supported,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let mut graphics = QueueFamily::new(QueueRole::Graphics);
        let info = family(vk::QueueFlags::GRAPHICS, false);

        assert!(graphics.offer(2, &info));
        assert!(!graphics.offer(2, &info));
        assert!(!graphics.offer(0, &info));
        assert_eq!(graphics.index(), Some(2));
    }

    #[test]
    fn test_rejected_family_keeps_role_open() {
        let mut presentation = QueueFamily::new(QueueRole::Presentation);

        assert!(!presentation.offer(0, &family(vk::QueueFlags::GRAPHICS, false)));
        assert!(presentation.get().is_err());
        assert!(presentation.offer(1, &family(vk::QueueFlags::TRANSFER, true)));
        assert_eq!(presentation.get().unwrap(), 1);
    }

    #[test]
    fn test_resolve_separate_families() {
        let indices = QueueFamilyIndices::resolve(&[
            family(vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ]);

        assert_eq!(indices.graphics(), Some(1));
        assert_eq!(indices.presentation(), Some(2));
        assert!(indices.is_complete());
        assert_eq!(indices.unique_indices(), vec![1, 2]);
    }

    #[test]
    fn test_combined_family_not_preferred() {
        // Family 1 could serve both roles, but graphics already resolved at 0
        let indices = QueueFamilyIndices::resolve(&[
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::GRAPHICS, true),
        ]);

        assert_eq!(indices.graphics(), Some(0));
        assert_eq!(indices.presentation(), Some(1));
    }

    #[test]
    fn test_missing_presentation_is_incomplete() {
        let indices = QueueFamilyIndices::resolve(&[family(vk::QueueFlags::GRAPHICS, false)]);

        assert!(!indices.is_complete());
        assert_eq!(indices.presentation(), None);
        assert_eq!(indices.unique_indices(), vec![0]);
    }
}
