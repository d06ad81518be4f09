use crate::context::DeviceSession;
use crate::error::{HeatError, Result};
use crate::traits::ComputeBackend;
use serde::{Deserialize, Serialize};

/// GPU classes a session may run on. CPU adapters are never candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuKind {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
}

impl GpuKind {
    /// Maps a wgpu device type, returning `None` for CPU and unknown adapters.
    pub fn from_device_type(device_type: wgpu::DeviceType) -> Option<Self> {
        match device_type {
            wgpu::DeviceType::DiscreteGpu => Some(GpuKind::DiscreteGpu),
            wgpu::DeviceType::IntegratedGpu => Some(GpuKind::IntegratedGpu),
            wgpu::DeviceType::VirtualGpu => Some(GpuKind::VirtualGpu),
            wgpu::DeviceType::Cpu | wgpu::DeviceType::Other => None,
        }
    }
}

/// Graphics APIs adapters are enumerated through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl BackendKind {
    pub fn to_wgpu(self) -> wgpu::Backends {
        match self {
            BackendKind::Vulkan => wgpu::Backends::VULKAN,
            BackendKind::Metal => wgpu::Backends::METAL,
            BackendKind::Dx12 => wgpu::Backends::DX12,
            BackendKind::Gl => wgpu::Backends::GL,
        }
    }
}

/// What to do when several adapters tie for the best rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ambiguity {
    /// Fail with `DeviceUnavailable` naming the tied adapters.
    #[default]
    Reject,
    /// Take the first tied adapter in enumeration order and log a warning.
    FirstMatch,
}

/// Explicit device selection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicePolicy {
    /// Acceptable GPU kinds, most preferred first.
    pub device_types: Vec<GpuKind>,
    /// Case-insensitive substring the adapter name must contain.
    pub name_filter: Option<String>,
    /// APIs to enumerate adapters on.
    pub backends: Vec<BackendKind>,
    pub on_ambiguity: Ambiguity,
}

impl Default for DevicePolicy {
    fn default() -> Self {
        Self {
            device_types: vec![GpuKind::DiscreteGpu, GpuKind::IntegratedGpu],
            name_filter: None,
            backends: vec![BackendKind::Vulkan, BackendKind::Metal, BackendKind::Dx12],
            on_ambiguity: Ambiguity::Reject,
        }
    }
}

impl DevicePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        device_types: Vec<GpuKind>,
        name_filter: Option<String>,
        on_ambiguity: Ambiguity,
    ) -> Self {
        Self {
            device_types,
            name_filter,
            on_ambiguity,
            ..Self::default()
        }
    }

    pub fn with_backends(mut self, backends: Vec<BackendKind>) -> Self {
        self.backends = backends;
        self
    }

    /// The configured backends as the flag set wgpu enumerates over.
    pub fn wgpu_backends(&self) -> wgpu::Backends {
        self.backends
            .iter()
            .fold(wgpu::Backends::empty(), |acc, b| acc | b.to_wgpu())
    }

    /// Whether `adapter` is a candidate at all under this policy.
    pub fn qualifies(&self, adapter: &AdapterSummary) -> bool {
        self.rank(adapter).is_some()
    }

    /// Rank of an adapter under this policy, lower is better. `None` means the
    /// adapter does not qualify.
    fn rank(&self, adapter: &AdapterSummary) -> Option<usize> {
        if !adapter.supports_f64 {
            return None;
        }
        if let Some(filter) = &self.name_filter {
            if !adapter.name.to_lowercase().contains(&filter.to_lowercase()) {
                return None;
            }
        }
        let kind = adapter.kind?;
        self.device_types.iter().position(|k| *k == kind)
    }

    /// Picks one adapter index out of `adapters` according to the policy.
    pub fn choose(&self, adapters: &[AdapterSummary]) -> Result<usize> {
        if self.device_types.is_empty() {
            return Err(HeatError::DeviceUnavailable(
                "device policy lists no acceptable GPU kinds".to_string(),
            ));
        }
        if self.backends.is_empty() {
            return Err(HeatError::DeviceUnavailable(
                "device policy lists no backends to enumerate".to_string(),
            ));
        }
        let ranked: Vec<(usize, usize)> = adapters
            .iter()
            .enumerate()
            .filter_map(|(i, a)| self.rank(a).map(|rank| (i, rank)))
            .collect();

        let Some(best) = ranked.iter().map(|&(_, rank)| rank).min() else {
            let seen = adapters
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(HeatError::DeviceUnavailable(format!(
                "no adapter matches {:?} with SHADER_F64 (found: [{}])",
                self, seen
            )));
        };

        let tied: Vec<usize> = ranked
            .iter()
            .filter(|&&(_, rank)| rank == best)
            .map(|&(i, _)| i)
            .collect();
        if tied.len() > 1 {
            let names = tied
                .iter()
                .map(|&i| adapters[i].to_string())
                .collect::<Vec<_>>()
                .join(", ");
            match self.on_ambiguity {
                Ambiguity::Reject => {
                    return Err(HeatError::DeviceUnavailable(format!(
                        "{} adapters match equally well: [{}]; \
                         narrow the policy with a name filter",
                        tied.len(),
                        names
                    )));
                }
                Ambiguity::FirstMatch => {
                    log::warn!("Ambiguous adapter selection [{}], taking the first", names);
                }
            }
        }
        Ok(tied[0])
    }
}

/// What the selection policy knows about an enumerated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: String,
    pub kind: Option<GpuKind>,
    pub supports_f64: bool,
}

impl AdapterSummary {
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        Self {
            name: info.name,
            backend: format!("{:?}", info.backend),
            kind: GpuKind::from_device_type(info.device_type),
            supports_f64: adapter.features().contains(wgpu::Features::SHADER_F64),
        }
    }
}

impl std::fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self
            .kind
            .map_or_else(|| "non-GPU".to_string(), |k| format!("{:?}", k));
        write!(f, "{} ({}, {}", self.name, self.backend, kind)?;
        if !self.supports_f64 {
            write!(f, ", no f64")?;
        }
        write!(f, ")")
    }
}

/// The wgpu compute backend. Cheap to clone and share; each `open` creates an
/// independent session.
#[derive(Debug, Clone, Default)]
pub struct GpuBackend {
    policy: DevicePolicy,
}

impl GpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DevicePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DevicePolicy {
        &self.policy
    }

    pub(crate) fn instance(backends: wgpu::Backends) -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        })
    }

    /// Every adapter on the policy's backends, paired with whether it
    /// qualifies under the policy.
    pub fn list_adapters(&self) -> Vec<(AdapterSummary, bool)> {
        let backends = self.policy.wgpu_backends();
        Self::instance(backends)
            .enumerate_adapters(backends)
            .iter()
            .map(AdapterSummary::from_adapter)
            .map(|summary| {
                let qualifies = self.policy.qualifies(&summary);
                (summary, qualifies)
            })
            .collect()
    }
}

impl ComputeBackend for GpuBackend {
    type Session = DeviceSession;

    fn open(&self) -> Result<DeviceSession> {
        DeviceSession::open(&self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, kind: Option<GpuKind>, supports_f64: bool) -> AdapterSummary {
        AdapterSummary {
            name: name.to_string(),
            backend: "Vulkan".to_string(),
            kind,
            supports_f64,
        }
    }

    #[test]
    fn test_prefers_discrete_over_integrated() {
        let adapters = vec![
            adapter("Intel UHD", Some(GpuKind::IntegratedGpu), true),
            adapter("RTX 4090", Some(GpuKind::DiscreteGpu), true),
        ];
        assert_eq!(DevicePolicy::default().choose(&adapters).unwrap(), 1);
    }

    #[test]
    fn test_skips_cpu_and_f64_less_adapters() {
        let adapters = vec![
            adapter("llvmpipe", None, true),
            adapter("Mobile GPU", Some(GpuKind::DiscreteGpu), false),
            adapter("Intel Arc", Some(GpuKind::IntegratedGpu), true),
        ];
        assert_eq!(DevicePolicy::default().choose(&adapters).unwrap(), 2);
    }

    #[test]
    fn test_no_candidates_is_device_unavailable() {
        let adapters = vec![adapter("llvmpipe", None, true)];
        match DevicePolicy::default().choose(&adapters) {
            Err(HeatError::DeviceUnavailable(msg)) => assert!(msg.contains("llvmpipe")),
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }
        assert!(DevicePolicy::default().choose(&[]).is_err());
    }

    #[test]
    fn test_tie_is_rejected_by_default() {
        let adapters = vec![
            adapter("GPU A", Some(GpuKind::DiscreteGpu), true),
            adapter("GPU B", Some(GpuKind::DiscreteGpu), true),
        ];
        match DevicePolicy::default().choose(&adapters) {
            Err(HeatError::DeviceUnavailable(msg)) => {
                assert!(msg.contains("GPU A"));
                assert!(msg.contains("GPU B"));
            }
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_resolved_by_name_filter_or_first_match() {
        let adapters = vec![
            adapter("GPU A", Some(GpuKind::DiscreteGpu), true),
            adapter("GPU B", Some(GpuKind::DiscreteGpu), true),
        ];
        let by_name = DevicePolicy::with_params(
            vec![GpuKind::DiscreteGpu],
            Some("gpu b".to_string()),
            Ambiguity::Reject,
        );
        assert_eq!(by_name.choose(&adapters).unwrap(), 1);

        let first =
            DevicePolicy::with_params(vec![GpuKind::DiscreteGpu], None, Ambiguity::FirstMatch);
        assert_eq!(first.choose(&adapters).unwrap(), 0);
    }

    #[test]
    fn test_empty_policy_selects_nothing() {
        let adapters = vec![adapter("GPU A", Some(GpuKind::DiscreteGpu), true)];
        let policy = DevicePolicy::with_params(vec![], None, Ambiguity::Reject);
        assert!(matches!(
            policy.choose(&adapters),
            Err(HeatError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_default_backends_are_native_apis() {
        assert_eq!(
            DevicePolicy::default().wgpu_backends(),
            wgpu::Backends::VULKAN | wgpu::Backends::METAL | wgpu::Backends::DX12
        );
        let gl_only = DevicePolicy::default().with_backends(vec![BackendKind::Gl]);
        assert_eq!(gl_only.wgpu_backends(), wgpu::Backends::GL);
    }

    #[test]
    fn test_no_backends_selects_nothing() {
        let adapters = vec![adapter("GPU A", Some(GpuKind::DiscreteGpu), true)];
        let policy = DevicePolicy::default().with_backends(vec![]);
        assert_eq!(policy.wgpu_backends(), wgpu::Backends::empty());
        assert!(matches!(
            policy.choose(&adapters),
            Err(HeatError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_qualification_matches_selection_rules() {
        let policy = DevicePolicy::default();
        assert!(policy.qualifies(&adapter("RTX", Some(GpuKind::DiscreteGpu), true)));
        assert!(!policy.qualifies(&adapter("RTX", Some(GpuKind::DiscreteGpu), false)));
        assert!(!policy.qualifies(&adapter("llvmpipe", None, true)));
        assert!(!policy.qualifies(&adapter("virtio", Some(GpuKind::VirtualGpu), true)));
        let named = DevicePolicy::with_params(
            vec![GpuKind::DiscreteGpu],
            Some("radeon".to_string()),
            Ambiguity::Reject,
        );
        assert!(!named.qualifies(&adapter("RTX", Some(GpuKind::DiscreteGpu), true)));
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: DevicePolicy = serde_json::from_str(r#"{"name_filter": "nvidia"}"#).unwrap();
        assert_eq!(policy.device_types, DevicePolicy::default().device_types);
        assert_eq!(policy.name_filter.as_deref(), Some("nvidia"));
        assert_eq!(policy.on_ambiguity, Ambiguity::Reject);
        assert_eq!(policy.backends, DevicePolicy::default().backends);

        let vulkan: DevicePolicy = serde_json::from_str(r#"{"backends": ["Vulkan"]}"#).unwrap();
        assert_eq!(vulkan.wgpu_backends(), wgpu::Backends::VULKAN);
    }
}
