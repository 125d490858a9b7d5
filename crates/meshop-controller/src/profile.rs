//! Profile resolution and merging
//!
//! Profiles live under `<resource_dir>/<version>/profiles/<name>.yaml`. A
//! profile is a full MeshControlPlane document; only its translated values
//! are used, merged underneath the control plane's own values.

use std::path::{Path, PathBuf};

use tracing::debug;

use meshop_common::crd::MeshControlPlaneSpec;
use meshop_common::values::ValueTree;
use meshop_common::yaml::parse_yaml;
use meshop_common::{Error, Result};
use meshop_conversion::{to_values, MeshVersion};

/// Profile used when a spec names none
pub const DEFAULT_PROFILE: &str = "default";

const PROFILES_DIR: &str = "profiles";
const PROFILE_EXTENSION: &str = "yaml";

/// Loads named profiles from a versioned resource directory
#[derive(Clone, Debug)]
pub struct ProfileLoader {
    resource_dir: PathBuf,
}

impl ProfileLoader {
    /// Create a loader rooted at `resource_dir`
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
        }
    }

    /// Directory holding the profiles of `version`
    pub fn profiles_dir(&self, version: MeshVersion) -> PathBuf {
        self.resource_dir.join(version.as_str()).join(PROFILES_DIR)
    }

    /// Resolve a profile name to a file inside the profiles directory
    ///
    /// The name must be a single plain path segment, and the canonical file
    /// path must stay within the canonical profiles directory, so symlinks
    /// pointing elsewhere are rejected too.
    pub fn resolve(&self, version: MeshVersion, name: &str) -> Result<PathBuf> {
        let name = if name.is_empty() { DEFAULT_PROFILE } else { name };
        validate_profile_name(name)?;

        let base = self.profiles_dir(version);
        let not_found = || Error::profile_not_found(name, version.as_str());

        let base = base.canonicalize().map_err(|_| not_found())?;
        let candidate = base.join(format!("{}.{}", name, PROFILE_EXTENSION));
        if !candidate.is_file() {
            return Err(not_found());
        }

        let resolved = candidate.canonicalize().map_err(|_| not_found())?;
        if !resolved.starts_with(&base) {
            return Err(Error::validation_for_field(
                meshop_common::error::UNKNOWN_CONTEXT,
                "spec.profile",
                format!("profile '{}' resolves outside the profiles directory", name),
            ));
        }
        Ok(resolved)
    }

    /// Read and parse a profile into a spec
    pub fn load(&self, version: MeshVersion, name: &str) -> Result<MeshControlPlaneSpec> {
        let path = self.resolve(version, name)?;
        read_profile(&path)
    }

    /// Translated values of a profile, translated for `version`
    ///
    /// The profile's structured fields win over its raw `values`.
    pub fn load_values(&self, version: MeshVersion, name: &str) -> Result<ValueTree> {
        let mut profile = self.load(version, name)?;
        profile.version = version.as_str().to_string();

        let mut values = to_values(&profile)?;
        values.merge_from(&profile.values);
        debug!(profile = %name, version = %version, "loaded profile values");
        Ok(values)
    }

    /// Merge the spec's profile underneath `values`
    ///
    /// `values` wins every collision; the profile only fills gaps.
    pub fn apply_profile(
        &self,
        spec: &MeshControlPlaneSpec,
        values: &ValueTree,
    ) -> Result<ValueTree> {
        let version = MeshVersion::parse(&spec.version)?;
        let profile = self.load_values(version, &spec.profile)?;
        Ok(ValueTree::merge(values, &profile))
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    let invalid = name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(Error::validation_for_field(
            meshop_common::error::UNKNOWN_CONTEXT,
            "spec.profile",
            format!("invalid profile name '{}'", name),
        ));
    }
    Ok(())
}

fn read_profile(path: &Path) -> Result<MeshControlPlaneSpec> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_with_context("profile", format!("failed to read {}: {}", path.display(), e))
    })?;
    let document = parse_yaml(&content).map_err(|e| {
        Error::validation(format!("profile {} is not valid YAML: {}", path.display(), e))
    })?;

    let spec = match document.get("spec") {
        Some(spec) => spec.clone(),
        None => serde_json::Value::Object(Default::default()),
    };
    serde_json::from_value(spec).map_err(|e| {
        Error::validation(format!("profile {} has an invalid spec: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const DEFAULT_PROFILE_YAML: &str = r#"
apiVersion: mesh.meshop.dev/v1alpha1
kind: MeshControlPlane
metadata:
  name: default
spec:
  values:
    pilot:
      replicaCount: 1
      autoscaleEnabled: true
    global:
      hub: docker.io/istio
"#;

    fn resource_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let profiles = dir.path().join("v3.0").join("profiles");
        std::fs::create_dir_all(&profiles).unwrap();
        std::fs::write(profiles.join("default.yaml"), DEFAULT_PROFILE_YAML).unwrap();
        std::fs::write(
            profiles.join("multicluster.yaml"),
            "spec:\n  cluster:\n    multiCluster:\n      enabled: true\n",
        )
        .unwrap();
        dir
    }

    fn spec(value: serde_json::Value) -> MeshControlPlaneSpec {
        serde_json::from_value(value).unwrap()
    }

    // ==========================================================================
    // Story Tests: Profile Resolution
    // ==========================================================================

    /// Story: An empty profile name falls back to "default"
    #[test]
    fn story_empty_name_resolves_default() {
        let dir = resource_dir();
        let loader = ProfileLoader::new(dir.path());
        let path = loader.resolve(MeshVersion::V3_0, "").unwrap();
        assert!(path.ends_with("default.yaml"));
    }

    /// Story: Traversal out of the profiles directory is rejected, not read
    ///
    /// A file sitting right next to the profiles directory is never loaded,
    /// even though the name points straight at it.
    #[test]
    fn story_traversal_is_a_validation_error() {
        let dir = resource_dir();
        std::fs::write(
            dir.path().join("v3.0").join("not-in-profiles-dir.yaml"),
            DEFAULT_PROFILE_YAML,
        )
        .unwrap();
        let loader = ProfileLoader::new(dir.path());

        let err = loader
            .resolve(MeshVersion::V3_0, "../not-in-profiles-dir")
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }), "got {err:?}");

        for name in ["..", ".", "a\\b"] {
            let err = loader.resolve(MeshVersion::V3_0, name).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "name {name}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_profiles_dir_is_rejected() {
        let dir = resource_dir();
        let outside = dir.path().join("secret.yaml");
        std::fs::write(&outside, DEFAULT_PROFILE_YAML).unwrap();
        std::os::unix::fs::symlink(
            &outside,
            dir.path().join("v3.0").join("profiles").join("sneaky.yaml"),
        )
        .unwrap();

        let loader = ProfileLoader::new(dir.path());
        let err = loader.resolve(MeshVersion::V3_0, "sneaky").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    /// Story: A missing profile never silently falls back
    #[test]
    fn story_missing_profile_is_not_found() {
        let dir = resource_dir();
        let loader = ProfileLoader::new(dir.path());

        let err = loader.resolve(MeshVersion::V3_0, "invalid").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { .. }));

        let err = loader.resolve(MeshVersion::V2_6, "default").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { .. }));
    }

    // ==========================================================================
    // Story Tests: Merging
    // ==========================================================================

    /// Story: Profile values only fill gaps
    #[test]
    fn story_resource_values_win_over_profile() {
        let dir = resource_dir();
        let loader = ProfileLoader::new(dir.path());

        let resource_values: ValueTree =
            serde_json::from_value(json!({"pilot": {"replicaCount": 3}})).unwrap();
        let merged = loader
            .apply_profile(&MeshControlPlaneSpec::default(), &resource_values)
            .unwrap();

        assert_eq!(merged.get_i64("pilot.replicaCount").unwrap(), Some(3));
        assert_eq!(merged.get_bool("pilot.autoscaleEnabled").unwrap(), Some(true));
        assert_eq!(
            merged.get_string("global.hub").unwrap().as_deref(),
            Some("docker.io/istio")
        );
    }

    #[test]
    fn structured_profile_fields_are_translated() {
        let dir = resource_dir();
        let loader = ProfileLoader::new(dir.path());
        let values = loader
            .apply_profile(&spec(json!({"profile": "multicluster"})), &ValueTree::new())
            .unwrap();
        assert_eq!(values.get_bool("global.multiCluster.enabled").unwrap(), Some(true));
        assert_eq!(values.get_bool("global.meshExpansion.enabled").unwrap(), Some(true));
    }

    #[test]
    fn unknown_version_fails_before_touching_disk() {
        let loader = ProfileLoader::new("/nonexistent");
        let err = loader
            .apply_profile(&spec(json!({"version": "v1.0"})), &ValueTree::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn malformed_profile_is_a_validation_error() {
        let dir = resource_dir();
        std::fs::write(
            dir.path().join("v3.0").join("profiles").join("broken.yaml"),
            "spec:\n  cluster: [1, 2]\n",
        )
        .unwrap();
        let loader = ProfileLoader::new(dir.path());
        let err = loader.load(MeshVersion::V3_0, "broken").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
