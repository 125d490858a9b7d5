//! Rendering child manifests from a value tree
//!
//! Charts are minijinja templates under `<resource_dir>/<version>/charts`.
//! Each template sees `Values` (the merged value tree) and `Release`
//! (`Name` of the control plane, `Namespace` it installs into) and may emit
//! any number of YAML documents.

use std::path::PathBuf;

use minijinja::{context, Environment, Error as TemplateError, ErrorKind, UndefinedBehavior, Value};
use serde_json::Value as JsonValue;

#[cfg(test)]
use mockall::automock;

use meshop_common::values::ValueTree;
use meshop_common::yaml::parse_yaml_multi;
use meshop_common::{Error, Result};
use meshop_conversion::MeshVersion;

const CHARTS_DIR: &str = "charts";
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "j2"];

/// Identity of the installation being rendered
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    /// Control plane name
    pub name: String,
    /// Namespace the control plane installs into
    pub namespace: String,
}

/// Turns a value tree into child manifests
#[cfg_attr(test, automock)]
pub trait ChartRenderer: Send + Sync {
    /// Render every chart of `version`
    ///
    /// Each returned value is one Kubernetes object.
    fn render(
        &self,
        version: MeshVersion,
        release: &Release,
        values: &ValueTree,
    ) -> Result<Vec<JsonValue>>;
}

/// Renders the template files found in the resource directory
pub struct TemplateDirRenderer {
    resource_dir: PathBuf,
}

impl TemplateDirRenderer {
    /// Create a renderer rooted at `resource_dir`
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
        }
    }

    fn template_files(&self, version: MeshVersion) -> Result<Vec<PathBuf>> {
        let dir = self.resource_dir.join(version.as_str()).join(CHARTS_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            Error::render(dir.display().to_string(), format!("cannot read charts: {}", e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    // values are sparse; templates guard on paths that may not exist
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.add_filter("to_json", to_json);
    env
}

fn to_json(value: Value) -> std::result::Result<String, TemplateError> {
    serde_json::to_string(&value)
        .map_err(|e| TemplateError::new(ErrorKind::InvalidOperation, e.to_string()))
}

impl ChartRenderer for TemplateDirRenderer {
    fn render(
        &self,
        version: MeshVersion,
        release: &Release,
        values: &ValueTree,
    ) -> Result<Vec<JsonValue>> {
        let env = environment();
        let ctx = context! {
            Values => values.to_json(),
            Release => context! {
                Name => release.name.as_str(),
                Namespace => release.namespace.as_str(),
            },
        };

        let mut objects = Vec::new();
        for path in self.template_files(version)? {
            let template_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = std::fs::read_to_string(&path)
                .map_err(|e| Error::render(&template_name, e.to_string()))?;
            let rendered = env
                .render_str(&source, &ctx)
                .map_err(|e| Error::render(&template_name, e.to_string()))?;
            let documents = parse_yaml_multi(&rendered)
                .map_err(|e| Error::render(&template_name, e.to_string()))?;
            objects.extend(documents);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const ISTIOD_TEMPLATE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: istiod
  namespace: {{ Release.Namespace }}
spec:
  replicas: {{ Values.pilot.replicaCount | default(1) }}
"#;

    const CNI_TEMPLATE: &str = r#"
{% if Values.istio_cni.enabled %}
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: istio-cni-node
  namespace: {{ Release.Namespace }}
{% endif %}
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: istio
  namespace: {{ Release.Namespace }}
data:
  meshNetworks: '{{ Values.global.meshNetworks | to_json }}'
"#;

    fn charts(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let charts = dir.path().join("v3.0").join("charts");
        std::fs::create_dir_all(&charts).unwrap();
        for (name, content) in files {
            std::fs::write(charts.join(name), content).unwrap();
        }
        dir
    }

    fn release() -> Release {
        Release {
            name: "basic".to_string(),
            namespace: "istio-system".to_string(),
        }
    }

    #[test]
    fn renders_values_and_release() {
        let dir = charts(&[("istiod.yaml", ISTIOD_TEMPLATE)]);
        let values: ValueTree =
            serde_json::from_value(json!({"pilot": {"replicaCount": 2}})).unwrap();

        let objects = TemplateDirRenderer::new(dir.path())
            .render(MeshVersion::V3_0, &release(), &values)
            .unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["metadata"]["namespace"], "istio-system");
        assert_eq!(objects[0]["spec"]["replicas"], 2);
    }

    #[test]
    fn disabled_blocks_emit_no_document() {
        let dir = charts(&[("cni.yaml", CNI_TEMPLATE), ("notes.txt", "ignored")]);
        let values: ValueTree = serde_json::from_value(json!({
            "global": {"meshNetworks": {"n1": {"endpoints": []}}}
        }))
        .unwrap();

        let objects = TemplateDirRenderer::new(dir.path())
            .render(MeshVersion::V3_0, &release(), &values)
            .unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["kind"], "ConfigMap");
        assert_eq!(objects[0]["data"]["meshNetworks"], r#"{"n1":{"endpoints":[]}}"#);
    }

    #[test]
    fn templates_render_in_file_name_order() {
        let dir = charts(&[
            ("b.yaml", "kind: B\n"),
            ("a.yaml", "kind: A\n"),
        ]);
        let objects = TemplateDirRenderer::new(dir.path())
            .render(MeshVersion::V3_0, &release(), &ValueTree::new())
            .unwrap();
        let kinds: Vec<_> = objects.iter().map(|o| o["kind"].clone()).collect();
        assert_eq!(kinds, vec![json!("A"), json!("B")]);
    }

    #[test]
    fn template_errors_name_the_file() {
        let dir = charts(&[("broken.yaml", "{% if %}")]);
        let err = TemplateDirRenderer::new(dir.path())
            .render(MeshVersion::V3_0, &release(), &ValueTree::new())
            .unwrap_err();
        assert!(matches!(err, Error::Render { ref template, .. } if template == "broken.yaml"));
    }

    #[test]
    fn missing_charts_dir_is_a_render_error() {
        let dir = TempDir::new().unwrap();
        let err = TemplateDirRenderer::new(dir.path())
            .render(MeshVersion::V2_4, &release(), &ValueTree::new())
            .unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }
}
