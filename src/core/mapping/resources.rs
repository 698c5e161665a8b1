//! Resource mapper: abstract CWL minimums to a concrete compute shape from the capability table.

use crate::core::cwl::model::Step;
use crate::core::cwl::requirements::{ResourceRequirement, ResourceValue};
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use crate::core::mapping::quantity::{ByteQuantity, MIB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Shape applied to steps that declare no `ResourceRequirement`: 2 cpus, 4 GiB, 2 hours.
pub const DEFAULT_COMPUTE_SHAPE: ComputeShape = ComputeShape {
    cpus: 2,
    memory: ByteQuantity::from_gibibytes(4),
    time: Duration::from_secs(2 * 60 * 60),
    disk: None,
    instance_class: None,
};

/// CWL defaults for a `ResourceRequirement` that omits `coresMin` or `ramMin`.
const CWL_DEFAULT_CORES: f64 = 1.0;
const CWL_DEFAULT_RAM: ByteQuantity = ByteQuantity::from_bytes(256 * MIB);

/// One row of the ordered capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub label: String,
    pub cpus: u32,
    pub memory: ByteQuantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_class: Option<String>,
}

impl CapabilityEntry {
    pub fn new(label: &str, cpus: u32, memory: ByteQuantity, instance_class: Option<&str>) -> Self {
        CapabilityEntry {
            label: label.to_string(),
            cpus,
            memory,
            instance_class: instance_class.map(str::to_string),
        }
    }

    pub fn satisfies(&self, cpus: u32, memory: ByteQuantity) -> bool {
        self.cpus >= cpus && self.memory >= memory
    }
}

impl fmt::Display for CapabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} cpus / {})", self.label, self.cpus, self.memory)
    }
}

/// Resolved, platform-concrete allocation for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeShape {
    pub cpus: u32,
    pub memory: ByteQuantity,
    #[serde(with = "duration_text")]
    pub time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<ByteQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_class: Option<String>,
}

impl ComputeShape {
    /// Nextflow `time` directive value, e.g. `2h` or `1h 30m`.
    pub fn time_directive(&self) -> String {
        format_duration(self.time)
    }
}

pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Durations as humantime text (`2h`, `90m`) in config files and JSON output.
pub mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Maps effective resource requirements onto the capability table.
///
/// The table is read-only and may be shared between concurrent conversions.
pub struct ResourceMapper<'a> {
    table: &'a [CapabilityEntry],
    default_shape: &'a ComputeShape,
    pinned: Option<&'a CapabilityEntry>,
}

impl<'a> ResourceMapper<'a> {
    pub fn new(table: &'a [CapabilityEntry], default_shape: &'a ComputeShape) -> Self {
        ResourceMapper {
            table,
            default_shape,
            pinned: None,
        }
    }

    /// Run every step on `entry`: requests are capped at its size instead of picking a fit.
    pub fn pinned_to(mut self, entry: Option<&'a CapabilityEntry>) -> Self {
        self.pinned = entry;
        self
    }

    /// Compute the shape for one step from its merged requirements.
    pub fn map_step(&self, step: &Step, diagnostics: &mut Diagnostics) -> ComputeShape {
        let mut shape = match step.requirements.resource() {
            Some(resource) => self.map_requirement(resource, &step.id, &step.field_path, diagnostics),
            None => match self.pinned {
                Some(pinned) => {
                    let default = self.default_shape;
                    self.pinned_shape(
                        pinned,
                        default.cpus,
                        default.memory,
                        default.disk,
                        &step.id,
                        &step.field_path,
                        diagnostics,
                    )
                }
                None => self.default_shape.clone(),
            },
        };
        if let Some(limit) = step.requirements.time_limit() {
            // A zero time limit means unlimited in CWL.
            if !limit.is_zero() {
                shape.time = limit;
            }
        }
        shape
    }

    pub fn map_requirement(
        &self,
        resource: &ResourceRequirement,
        step_id: &str,
        location: &str,
        diagnostics: &mut Diagnostics,
    ) -> ComputeShape {
        for (field, expression) in resource.expressions() {
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-RES-002",
                    location,
                    format!(
                        "{} of step '{}' is an expression ({}) and cannot be evaluated; using defaults",
                        field, step_id, expression
                    ),
                )
                .with_suggestion("replace the expression with a literal minimum"),
            );
        }

        let cores = fixed_or(&resource.cores_min, &resource.cores_max, CWL_DEFAULT_CORES);
        let ram = fixed_or(&resource.ram_min, &resource.ram_max, CWL_DEFAULT_RAM);
        let cpus = cores.ceil().max(1.0) as u32;
        let disk = [&resource.tmpdir_min, &resource.outdir_min]
            .into_iter()
            .filter_map(|value| value.as_ref().and_then(ResourceValue::fixed))
            .max();

        if let Some(pinned) = self.pinned {
            return self.pinned_shape(pinned, cpus, ram, disk, step_id, location, diagnostics);
        }

        let Some((entry, exceeded)) = self.select(cpus, ram) else {
            return ComputeShape {
                disk,
                ..self.default_shape.clone()
            };
        };
        if exceeded {
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-RES-001",
                    location,
                    format!(
                        "step '{}' needs {} cpus / {} but the largest compute shape is {}; using it anyway",
                        step_id, cpus, ram, entry
                    ),
                )
                .with_suggestion("add a larger entry to the capability table"),
            );
        }

        ComputeShape {
            cpus: entry.cpus,
            memory: entry.memory,
            time: self.default_shape.time,
            disk,
            instance_class: entry.instance_class.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pinned_shape(
        &self,
        pinned: &CapabilityEntry,
        cpus: u32,
        memory: ByteQuantity,
        disk: Option<ByteQuantity>,
        step_id: &str,
        location: &str,
        diagnostics: &mut Diagnostics,
    ) -> ComputeShape {
        if !pinned.satisfies(cpus, memory) {
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-RES-001",
                    location,
                    format!(
                        "step '{}' needs {} cpus / {} but every step is pinned to {}; capping the request",
                        step_id, cpus, memory, pinned
                    ),
                )
                .with_suggestion("pin a larger instance type or drop the pin"),
            );
        }
        ComputeShape {
            cpus: cpus.min(pinned.cpus),
            memory: memory.min(pinned.memory),
            time: self.default_shape.time,
            disk,
            instance_class: Some(
                pinned
                    .instance_class
                    .clone()
                    .unwrap_or_else(|| pinned.label.clone()),
            ),
        }
    }

    /// First entry satisfying both minimums, or the last entry flagged as exceeded.
    pub fn select(&self, cpus: u32, memory: ByteQuantity) -> Option<(&'a CapabilityEntry, bool)> {
        if let Some(entry) = self.table.iter().find(|entry| entry.satisfies(cpus, memory)) {
            return Some((entry, false));
        }
        self.table.last().map(|entry| (entry, true))
    }
}

fn fixed_or<T: Copy>(min: &Option<ResourceValue<T>>, max: &Option<ResourceValue<T>>, default: T) -> T {
    min.as_ref()
        .and_then(ResourceValue::fixed)
        .or_else(|| max.as_ref().and_then(ResourceValue::fixed))
        .unwrap_or(default)
}
