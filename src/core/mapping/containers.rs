//! Container mapper: registry rewrites and artifact-registry push targets.

use crate::core::cwl::model::Step;
use crate::core::diagnostics::{Diagnostic, Diagnostics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Image used for steps that declare no `DockerRequirement`.
pub const DEFAULT_CONTAINER: &str = "public.ecr.aws/docker/library/ubuntu:22.04";

/// Registry assumed for references without an explicit host.
pub const IMPLICIT_REGISTRY: &str = "docker.io";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// A rewrite rule matched.
    Rewritten,
    /// Already hosted on the target registry.
    Target,
    /// No rule matched; passed through unchanged.
    Unmapped,
    /// No image declared; the configured default applies.
    PlatformDefault,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryKind::Rewritten => "rewritten",
            RegistryKind::Target => "target",
            RegistryKind::Unmapped => "unmapped",
            RegistryKind::PlatformDefault => "platform_default",
        };
        write!(f, "{}", name)
    }
}

/// Resolved container reference for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    pub target_image: String,
    pub registry_kind: RegistryKind,
    /// Re-tagged reference under the configured artifact registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_target: Option<String>,
}

/// Ordered `source_prefix -> target_prefix` rule; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRewrite {
    pub source_prefix: String,
    pub target_prefix: String,
}

impl RegistryRewrite {
    pub fn new(source_prefix: &str, target_prefix: &str) -> Self {
        RegistryRewrite {
            source_prefix: source_prefix.to_string(),
            target_prefix: target_prefix.to_string(),
        }
    }

    fn apply(&self, image: &str) -> Option<String> {
        image
            .strip_prefix(&self.source_prefix)
            .map(|rest| format!("{}{}", self.target_prefix, rest))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRefError {
    #[error("empty image reference")]
    Empty,
    #[error("invalid image reference '{0}'")]
    Invalid(String),
}

/// A parsed `[registry/]repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Repository plus tag or digest, without the registry host.
    pub fn path(&self) -> String {
        let mut path = self.repository.clone();
        if let Some(tag) = &self.tag {
            path.push(':');
            path.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            path.push('@');
            path.push_str(digest);
        }
        path
    }

    pub fn is_target_registry(&self) -> bool {
        self.registry == "public.ecr.aws" || self.registry.contains(".dkr.ecr.")
    }
}

impl FromStr for ImageReference {
    type Err = ImageRefError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ImageRefError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ImageRefError::Invalid(input.to_string()));
        }
        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (trimmed, None),
        };
        // A tag colon comes after the last slash; earlier colons belong to a registry port.
        let last_slash = name.rfind('/').map_or(0, |index| index + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(index) => {
                let split = last_slash + index;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };
        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => {
                (host.to_string(), rest.to_string())
            }
            Some(_) => (IMPLICIT_REGISTRY.to_string(), name.to_string()),
            None => (IMPLICIT_REGISTRY.to_string(), format!("library/{}", name)),
        };
        if repository.is_empty() || tag.as_deref() == Some("") || digest.as_deref() == Some("") {
            return Err(ImageRefError::Invalid(input.to_string()));
        }
        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path())
    }
}

pub struct ContainerMapper<'a> {
    rewrites: &'a [RegistryRewrite],
    default_container: &'a str,
    artifact_registry: Option<&'a str>,
}

impl<'a> ContainerMapper<'a> {
    pub fn new(
        rewrites: &'a [RegistryRewrite],
        default_container: &'a str,
        artifact_registry: Option<&'a str>,
    ) -> Self {
        ContainerMapper {
            rewrites,
            default_container,
            artifact_registry,
        }
    }

    pub fn map_step(&self, step: &Step, diagnostics: &mut Diagnostics) -> ContainerRef {
        let location = step.field_path.as_str();
        let Some(docker) = step.requirements.docker() else {
            diagnostics.push(Diagnostic::info(
                "CWL-IMG-002",
                location,
                format!(
                    "step '{}' declares no container; using {}",
                    step.id, self.default_container
                ),
            ));
            return self.platform_default();
        };
        if docker.needs_local_image() {
            diagnostics.push(
                Diagnostic::warning(
                    "CWL-IMG-003",
                    location,
                    format!(
                        "step '{}' builds or loads its image locally (dockerFile/dockerLoad); using {}",
                        step.id, self.default_container
                    ),
                )
                .with_suggestion("publish the image to a registry and use dockerPull"),
            );
            return self.platform_default();
        }
        match docker.image() {
            Some(image) => self.map_image(image, &step.id, location, diagnostics),
            None => self.platform_default(),
        }
    }

    /// Rewrite one image reference against the ordered table.
    pub fn map_image(
        &self,
        image: &str,
        step_id: &str,
        location: &str,
        diagnostics: &mut Diagnostics,
    ) -> ContainerRef {
        let parsed = match image.parse::<ImageReference>() {
            Ok(parsed) => parsed,
            Err(err) => {
                diagnostics.push(Diagnostic::warning(
                    "CWL-IMG-001",
                    location,
                    format!("step '{}': {}; passing it through unchanged", step_id, err),
                ));
                return ContainerRef {
                    original_image: Some(image.to_string()),
                    target_image: image.to_string(),
                    registry_kind: RegistryKind::Unmapped,
                    push_target: None,
                };
            }
        };

        if parsed.is_target_registry() {
            return ContainerRef {
                original_image: Some(image.to_string()),
                target_image: image.to_string(),
                registry_kind: RegistryKind::Target,
                push_target: None,
            };
        }

        let canonical = parsed.to_string();
        let rewritten = self.rewrites.iter().find_map(|rule| {
            rule.apply(image.trim())
                .or_else(|| rule.apply(&canonical))
        });
        let push_target = self
            .artifact_registry
            .map(|registry| format!("{}/{}", registry.trim_end_matches('/'), parsed.path()));

        match rewritten {
            Some(target_image) => ContainerRef {
                original_image: Some(image.to_string()),
                target_image,
                registry_kind: RegistryKind::Rewritten,
                push_target,
            },
            None => {
                diagnostics.push(
                    Diagnostic::warning(
                        "CWL-IMG-001",
                        location,
                        format!(
                            "image '{}' of step '{}' matches no registry rewrite; kept as is",
                            image, step_id
                        ),
                    )
                    .with_suggestion("add a registry_rewrites entry for its registry"),
                );
                ContainerRef {
                    original_image: Some(image.to_string()),
                    target_image: image.to_string(),
                    registry_kind: RegistryKind::Unmapped,
                    push_target,
                }
            }
        }
    }

    fn platform_default(&self) -> ContainerRef {
        ContainerRef {
            original_image: None,
            target_image: self.default_container.to_string(),
            registry_kind: RegistryKind::PlatformDefault,
            push_target: None,
        }
    }
}

/// Shell script that mirrors source images into the target registry.
///
/// `refs` pairs a step id with its resolved reference. Steps without a differing
/// destination are skipped; duplicates are pushed once.
pub fn generate_push_script(refs: &[(String, ContainerRef)], region: Option<&str>) -> String {
    let mut lines = vec![
        "#!/usr/bin/env bash".to_string(),
        "# Mirror workflow container images into the target registry.".to_string(),
        "set -euo pipefail".to_string(),
        String::new(),
        format!("AWS_REGION=\"${{AWS_REGION:-{}}}\"", region.unwrap_or("us-east-1")),
        String::new(),
    ];

    let mut pushed: Vec<&str> = Vec::new();
    let mut login_hosts: Vec<&str> = Vec::new();
    let mut body = Vec::new();
    for (step_id, container) in refs {
        let Some(source) = container.original_image.as_deref() else {
            continue;
        };
        let destination = match (&container.push_target, container.registry_kind) {
            (Some(target), _) => target.as_str(),
            (None, RegistryKind::Rewritten) => container.target_image.as_str(),
            _ => continue,
        };
        if destination == source || pushed.contains(&destination) {
            continue;
        }
        pushed.push(destination);
        let host = destination.split('/').next().unwrap_or(destination);
        if !login_hosts.contains(&host) {
            login_hosts.push(host);
        }
        body.push(format!("echo \"Mirroring image for step {}\"", step_id));
        body.push(format!("docker pull {}", source));
        body.push(format!("docker tag {} {}", source, destination));
        body.push(format!("docker push {}", destination));
        body.push(String::new());
    }

    for host in &login_hosts {
        if *host == "public.ecr.aws" {
            lines.push(
                "aws ecr-public get-login-password --region us-east-1 | docker login --username AWS --password-stdin public.ecr.aws"
                    .to_string(),
            );
        } else {
            lines.push(format!(
                "aws ecr get-login-password --region \"$AWS_REGION\" | docker login --username AWS --password-stdin {}",
                host
            ));
        }
    }
    if !login_hosts.is_empty() {
        lines.push(String::new());
    }
    lines.extend(body);
    lines.push(format!("echo \"{} image(s) mirrored\"", pushed.len()));
    lines.join("\n") + "\n"
}
