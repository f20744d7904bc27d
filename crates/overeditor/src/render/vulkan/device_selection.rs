//! Physical device enumeration, scoring and election
//!
//! Every physical device is queried once into a [`DeviceDescriptor`]. Scoring
//! and suitability only look at that snapshot, so election logic runs (and is
//! tested) without a GPU.

use std::cmp::Reverse;

use ash::extensions::khr::Surface;
use ash::{vk, Instance};

use crate::core::config::{DeviceScoringConfig, VulkanRendererConfig};
use crate::foundation::status::SuccessStatus;
use crate::render::vulkan::queue_families::{QueueFamilyIndices, QueueFamilyInfo};
use crate::render::vulkan::requirements::{raw_name, Requirements, VulkanRequirements};
use crate::render::vulkan::swapchain::SwapchainSupportDetails;
use crate::render::vulkan::{VulkanError, VulkanResult};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Everything election needs to know about one physical device
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor {
    /// Device properties (name, type, limits)
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families, with surface support already resolved
    pub queue_families: Vec<QueueFamilyInfo>,
    /// Supported device extension names
    pub extensions: Vec<String>,
    /// Supported device layer names
    pub layers: Vec<String>,
    /// Swapchain support for the target surface
    pub swapchain_support: SwapchainSupportDetails,
}

impl DeviceDescriptor {
    /// Snapshot a physical device against `surface`
    pub fn query(
        instance: &Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let family_properties = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut queue_families = Vec::with_capacity(family_properties.len());
        for (index, family) in (0u32..).zip(&family_properties) {
            let presentation_supported = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            queue_families.push(QueueFamilyInfo {
                flags: family.queue_flags,
                queue_count: family.queue_count,
                presentation_supported,
            });
        }

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        }
        .iter()
        .map(|extension| raw_name(&extension.extension_name))
        .collect();

        let layers = unsafe {
            instance
                .enumerate_device_layer_properties(device)
                .map_err(VulkanError::Api)?
        }
        .iter()
        .map(|layer| raw_name(&layer.layer_name))
        .collect();

        let swapchain_support = SwapchainSupportDetails::query(surface_loader, device, surface)?;

        Ok(Self {
            properties,
            memory_properties,
            queue_families,
            extensions,
            layers,
            swapchain_support,
        })
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        raw_name(&self.properties.device_name)
    }

    /// Memory heaps actually reported (the fixed array is padded)
    pub fn memory_heaps(&self) -> &[vk::MemoryHeap] {
        let count = (self.memory_properties.memory_heap_count as usize).min(vk::MAX_MEMORY_HEAPS);
        &self.memory_properties.memory_heaps[..count]
    }

    /// Total size of all device-local heaps, in bytes
    pub fn device_local_memory(&self) -> vk::DeviceSize {
        self.memory_heaps()
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

/// Score a device: discrete bonus plus device-local GiB times the multiplier
pub fn score_device(descriptor: &DeviceDescriptor, scoring: &DeviceScoringConfig) -> u32 {
    let mut score = 0u32;
    if descriptor.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score = score.saturating_add(scoring.discrete_gpu_bonus);
    }
    let gib = descriptor.device_local_memory() as f64 / BYTES_PER_GIB;
    let memory_score = (gib * f64::from(scoring.memory_score_multiplier)).floor();
    score.saturating_add(memory_score.min(f64::from(u32::MAX)) as u32)
}

/// Collect every reason a device cannot be used
pub fn assess_suitability(
    descriptor: &DeviceDescriptor,
    indices: &QueueFamilyIndices,
    requirements: &VulkanRequirements,
) -> SuccessStatus {
    let mut status = SuccessStatus::new();
    if indices.graphics().is_none() {
        status.add_error("Graphics queue not supported");
    }
    if indices.presentation().is_none() {
        status.add_error("Presentation queue not supported");
    }
    status.merge(requirements.check(&descriptor.extensions, &descriptor.layers));
    if descriptor.swapchain_support.formats.is_empty() {
        status.add_error("There are no surface formats available");
    }
    if descriptor.swapchain_support.present_modes.is_empty() {
        status.add_error("There are no presentation modes available");
    }
    status
}

/// A scored physical device
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    handle: vk::PhysicalDevice,
    descriptor: DeviceDescriptor,
    indices: QueueFamilyIndices,
    score: u32,
    status: SuccessStatus,
}

impl PhysicalDeviceCandidate {
    /// Resolve queues, score and check suitability of a described device
    pub fn evaluate(
        handle: vk::PhysicalDevice,
        descriptor: DeviceDescriptor,
        requirements: &VulkanRequirements,
        scoring: &DeviceScoringConfig,
    ) -> Self {
        let indices = QueueFamilyIndices::resolve(&descriptor.queue_families);
        let status = assess_suitability(&descriptor, &indices, requirements);
        let score = score_device(&descriptor, scoring);
        Self {
            handle,
            descriptor,
            indices,
            score,
            status,
        }
    }

    /// Physical device handle
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Snapshot the candidate was built from
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Resolved queue families
    pub fn indices(&self) -> &QueueFamilyIndices {
        &self.indices
    }

    /// Election score
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Suitability report
    pub fn status(&self) -> &SuccessStatus {
        &self.status
    }

    /// Whether the device can be elected
    pub fn is_suitable(&self) -> bool {
        self.status.is_successful()
    }

    /// Log name, score, heaps, queue families and suitability
    pub fn log_summary(&self) {
        log::info!(
            "Candidate {} ({:?}), score {}",
            self.descriptor.name(),
            self.descriptor.properties.device_type,
            self.score
        );
        for (index, heap) in self.descriptor.memory_heaps().iter().enumerate() {
            log::info!("  heap {}: {} bytes, {:?}", index, heap.size, heap.flags);
        }
        for (index, family) in self.descriptor.queue_families.iter().enumerate() {
            log::info!(
                "  queue family {}: {:?} x{}, presentation: {}",
                index,
                family.flags,
                family.queue_count,
                family.presentation_supported
            );
        }
        self.status.log_errors();
    }
}

/// Extensions and layers every candidate device must support
pub fn device_requirements(config: &VulkanRendererConfig) -> VulkanRequirements {
    VulkanRequirements::new(
        Requirements::new(config.device_extensions.iter().cloned()),
        Requirements::new(config.device_layers.iter().cloned()),
    )
}

/// Query and evaluate every physical device the instance exposes
pub fn enumerate_candidates(
    instance: &Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
    requirements: &VulkanRequirements,
    scoring: &DeviceScoringConfig,
) -> VulkanResult<Vec<PhysicalDeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };
    if devices.is_empty() {
        return Err(VulkanError::InitializationFailed(
            "Failed to find GPUs with Vulkan support".to_string(),
        ));
    }

    devices
        .into_iter()
        .map(|device| {
            let descriptor = DeviceDescriptor::query(instance, surface_loader, surface, device)?;
            let candidate = PhysicalDeviceCandidate::evaluate(device, descriptor, requirements, scoring);
            candidate.log_summary();
            Ok(candidate)
        })
        .collect()
}

/// Highest-scoring suitable candidate; ties keep enumeration order
pub fn elect(candidates: Vec<PhysicalDeviceCandidate>) -> VulkanResult<PhysicalDeviceCandidate> {
    let mut suitable: Vec<_> = candidates
        .into_iter()
        .filter(PhysicalDeviceCandidate::is_suitable)
        .collect();
    suitable.sort_by_key(|candidate| Reverse(candidate.score()));

    let elected = suitable.into_iter().next().ok_or(VulkanError::NoSuitableDevice)?;
    log::info!("Elected {} with score {}", elected.descriptor.name(), elected.score);
    Ok(elected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const GIB: vk::DeviceSize = 1024 * 1024 * 1024;

    fn descriptor(device_type: vk::PhysicalDeviceType, local_memory: vk::DeviceSize) -> DeviceDescriptor {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: local_memory,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory_properties.memory_heaps[1] = vk::MemoryHeap {
            size: 16 * GIB,
            flags: vk::MemoryHeapFlags::empty(),
        };

        DeviceDescriptor {
            properties: vk::PhysicalDeviceProperties {
                device_type,
                ..Default::default()
            },
            memory_properties,
            queue_families: vec![QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                presentation_supported: true,
            }],
            extensions: vec!["VK_KHR_swapchain".to_string()],
            layers: Vec::new(),
            swapchain_support: SwapchainSupportDetails {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
        }
    }

    fn requirements() -> VulkanRequirements {
        VulkanRequirements::new(Requirements::new(["VK_KHR_swapchain"]), Requirements::default())
    }

    fn candidate(raw: u64, descriptor: DeviceDescriptor) -> PhysicalDeviceCandidate {
        PhysicalDeviceCandidate::evaluate(
            vk::PhysicalDevice::from_raw(raw),
            descriptor,
            &requirements(),
            &DeviceScoringConfig::default(),
        )
    }

    #[test]
    fn test_discrete_outscores_integrated() {
        let scoring = DeviceScoringConfig::default();
        let discrete = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 4 * GIB);
        let integrated = descriptor(vk::PhysicalDeviceType::INTEGRATED_GPU, 4 * GIB);

        assert!(score_device(&discrete, &scoring) > score_device(&integrated, &scoring));
        assert_eq!(score_device(&discrete, &scoring), 1500 + 400);
        assert_eq!(score_device(&integrated, &scoring), 400);
    }

    #[test]
    fn test_score_monotonic_in_memory() {
        let scoring = DeviceScoringConfig::default();
        let mut previous = 0;
        for half_gib in 0..32u64 {
            let current = score_device(
                &descriptor(vk::PhysicalDeviceType::INTEGRATED_GPU, half_gib * GIB / 2),
                &scoring,
            );
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_non_local_heaps_ignored() {
        let descriptor = descriptor(vk::PhysicalDeviceType::CPU, 0);
        assert_eq!(descriptor.device_local_memory(), 0);
        assert_eq!(score_device(&descriptor, &DeviceScoringConfig::default()), 0);
    }

    #[test]
    fn test_complete_device_is_suitable() {
        let candidate = candidate(1, descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, GIB));
        assert!(candidate.is_suitable(), "{:?}", candidate.status());
    }

    #[test]
    fn test_missing_extension_is_unsuitable() {
        let mut described = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 8 * GIB);
        described.extensions.clear();
        let candidate = candidate(1, described);

        assert!(!candidate.is_suitable());
        assert_eq!(
            candidate.status().errors(),
            &["Required extension not present: VK_KHR_swapchain"]
        );
    }

    #[test]
    fn test_missing_presentation_is_unsuitable() {
        let mut described = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 8 * GIB);
        described.queue_families[0].presentation_supported = false;
        let candidate = candidate(1, described);

        assert_eq!(candidate.status().errors(), &["Presentation queue not supported"]);
    }

    #[test]
    fn test_no_surface_formats_is_unsuitable() {
        let mut described = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 8 * GIB);
        described.swapchain_support.formats.clear();
        described.swapchain_support.present_modes.clear();
        let candidate = candidate(1, described);

        assert_eq!(
            candidate.status().errors(),
            &[
                "There are no surface formats available",
                "There are no presentation modes available",
            ]
        );
    }

    #[test]
    fn test_election_skips_unsuitable_high_score() {
        let mut best_but_broken = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 24 * GIB);
        best_but_broken.swapchain_support.formats.clear();

        let elected = elect(vec![
            candidate(1, best_but_broken),
            candidate(2, descriptor(vk::PhysicalDeviceType::INTEGRATED_GPU, GIB)),
            candidate(3, descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, 2 * GIB)),
        ])
        .unwrap();

        assert_eq!(elected.handle().as_raw(), 3);
    }

    #[test]
    fn test_election_tie_keeps_enumeration_order() {
        let elected = elect(vec![
            candidate(7, descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, GIB)),
            candidate(8, descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, GIB)),
        ])
        .unwrap();

        assert_eq!(elected.handle().as_raw(), 7);
    }

    #[test]
    fn test_election_without_suitable_candidate_fails() {
        let mut broken = descriptor(vk::PhysicalDeviceType::DISCRETE_GPU, GIB);
        broken.queue_families.clear();

        let result = elect(vec![candidate(1, broken)]);
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice)));
    }

    #[test]
    fn test_device_requirements_follow_config() {
        let config = VulkanRendererConfig::new("test");
        let requirements = device_requirements(&config);

        assert_eq!(requirements.extensions.names(), ["VK_KHR_swapchain".to_string()]);
        assert!(requirements.layers.is_empty());
    }
}
