//! Required extensions and layers
//!
//! Requirements are plain name lists checked against whatever a driver or
//! physical device reports. Checking never touches Vulkan, so the same code
//! validates the instance at startup and every device candidate.

use std::ffi::{c_char, CStr, CString};

use crate::foundation::status::SuccessStatus;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Convert a fixed-size, NUL-terminated Vulkan name array into a `String`
pub(crate) fn raw_name(raw: &[c_char]) -> String {
    if !raw.contains(&0) {
        return String::new();
    }
    // SAFETY: the slice holds a NUL terminator, checked above
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// A list of names that must all be present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    names: Vec<String>,
}

impl Requirements {
    /// Create requirements from any list of names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Required names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether nothing is required
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names that are absent from `available`
    pub fn missing<'a>(&'a self, available: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
        self.names
            .iter()
            .filter(move |name| !available.iter().any(|a| a == *name))
    }

    /// Record one error per missing name, labelled with `kind`
    pub fn check(&self, kind: &str, available: &[String]) -> SuccessStatus {
        let mut status = SuccessStatus::new();
        for name in self.missing(available) {
            status.add_error(format!("Required {} not present: {}", kind, name));
        }
        status
    }

    /// Keep only the names present in `available`
    pub fn retain_available(&self, available: &[String]) -> Self {
        Self {
            names: self
                .names
                .iter()
                .filter(|name| available.contains(name))
                .cloned()
                .collect(),
        }
    }

    /// Names as C strings, for create-info structures
    pub fn to_cstrings(&self) -> VulkanResult<Vec<CString>> {
        self.names
            .iter()
            .map(|name| {
                CString::new(name.as_str()).map_err(|_| {
                    VulkanError::InitializationFailed(format!("Invalid requirement name: {}", name))
                })
            })
            .collect()
    }
}

/// Extension and layer requirements for an instance or a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VulkanRequirements {
    /// Required extensions
    pub extensions: Requirements,
    /// Required layers
    pub layers: Requirements,
}

impl VulkanRequirements {
    /// Create requirements from extension and layer names
    pub fn new(extensions: Requirements, layers: Requirements) -> Self {
        Self { extensions, layers }
    }

    /// Check both lists, extensions first
    pub fn check(&self, available_extensions: &[String], available_layers: &[String]) -> SuccessStatus {
        let mut status = self.extensions.check("extension", available_extensions);
        status.merge(self.layers.check("layer", available_layers));
        status
    }

    /// The subset of requirements that can actually be enabled
    pub fn retain_available(&self, available_extensions: &[String], available_layers: &[String]) -> Self {
        Self {
            extensions: self.extensions.retain_available(available_extensions),
            layers: self.layers.retain_available(available_layers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_present_is_successful() {
        let requirements = VulkanRequirements::new(
            Requirements::new(["VK_KHR_swapchain"]),
            Requirements::default(),
        );
        let status = requirements.check(&names(&["VK_KHR_swapchain", "VK_KHR_maintenance1"]), &[]);
        assert!(status.is_successful());
    }

    #[test]
    fn test_missing_names_are_reported() {
        let requirements = VulkanRequirements::new(
            Requirements::new(["VK_KHR_swapchain"]),
            Requirements::new(["VK_LAYER_KHRONOS_validation"]),
        );
        let status = requirements.check(&[], &[]);
        assert_eq!(
            status.errors(),
            &[
                "Required extension not present: VK_KHR_swapchain",
                "Required layer not present: VK_LAYER_KHRONOS_validation",
            ]
        );
    }

    #[test]
    fn test_retain_available_drops_missing() {
        let requirements = Requirements::new(["a", "b", "c"]);
        let kept = requirements.retain_available(&names(&["c", "a"]));
        assert_eq!(kept.names(), &["a", "c"]);
    }

    #[test]
    fn test_raw_name_reads_until_nul() {
        let mut raw = [0 as c_char; 8];
        for (slot, byte) in raw.iter_mut().zip(b"abc") {
            *slot = *byte as c_char;
        }
        assert_eq!(raw_name(&raw), "abc");
    }
}
