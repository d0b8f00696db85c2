//! YAML extractor for Compose files and GitHub Actions workflows.
//!
//! YAML is a plain-text configuration format; `serde_yaml` is the
//! parser. Emits the verbatim config row plus env declarations, service
//! image references, and action `uses:` references.

use seep_core::errors::ExtractError;
use serde_yaml::Value;

use super::{ConfigFileFact, EnvUsageFact, ExtractedFacts, Extractor, FileInfo, RefFact};

pub struct YamlExtractor;

impl Extractor for YamlExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".yml", ".yaml"]
    }

    fn extract(&self, file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError> {
        let mut facts = ExtractedFacts::default();

        let doc: Value = serde_yaml::from_str(content).map_err(|e| ExtractError::ParseFailed {
            file: file.path.clone(),
            message: e.to_string(),
        })?;

        let is_workflow = file.path.contains(".github/workflows/");
        let is_compose = {
            let name = file.path.rsplit('/').next().unwrap_or("");
            name.starts_with("docker-compose") || name.starts_with("compose")
        };

        let file_type = if is_workflow {
            "github_actions"
        } else if is_compose {
            "compose"
        } else {
            "yaml"
        };
        facts.config_file = Some(ConfigFileFact {
            content: content.to_string(),
            file_type: file_type.to_string(),
            context_dir: Some(seep_core::paths::parent(&file.path)),
        });

        if is_workflow {
            extract_workflow(&doc, &mut facts);
        } else if is_compose {
            extract_compose(&doc, &mut facts);
        }

        Ok(facts)
    }
}

fn extract_workflow(doc: &Value, facts: &mut ExtractedFacts) {
    collect_env_maps(doc, facts);

    let Some(jobs) = doc.get("jobs").and_then(Value::as_mapping) else { return };
    for (_job_name, job) in jobs {
        let Some(steps) = job.get("steps").and_then(Value::as_sequence) else { continue };
        for step in steps {
            if let Some(uses) = step.get("uses").and_then(Value::as_str) {
                facts.refs.push(RefFact {
                    kind: "action".to_string(),
                    value: uses.to_string(),
                    line: None,
                });
            }
            // ${{ … }} interpolations in run scripts are untrusted when
            // they reference event payload fields.
            if let Some(run) = step.get("run").and_then(Value::as_str) {
                for expr in interpolations(run) {
                    facts.env_usages.push(EnvUsageFact {
                        line: 0,
                        var_name: expr,
                        in_function: "global".to_string(),
                        access_method: "workflow_expression".to_string(),
                    });
                }
            }
        }
    }
}

fn extract_compose(doc: &Value, facts: &mut ExtractedFacts) {
    let Some(services) = doc.get("services").and_then(Value::as_mapping) else { return };
    for (_name, service) in services {
        if let Some(image) = service.get("image").and_then(Value::as_str) {
            facts.refs.push(RefFact {
                kind: "docker_image".to_string(),
                value: image.to_string(),
                line: None,
            });
        }
        match service.get("environment") {
            Some(Value::Mapping(map)) => {
                for (key, _value) in map {
                    if let Some(name) = key.as_str() {
                        facts.env_usages.push(EnvUsageFact {
                            line: 0,
                            var_name: name.to_string(),
                            in_function: "global".to_string(),
                            access_method: "compose_environment".to_string(),
                        });
                    }
                }
            }
            Some(Value::Sequence(entries)) => {
                for entry in entries {
                    if let Some(decl) = entry.as_str() {
                        let name = decl.split('=').next().unwrap_or(decl);
                        facts.env_usages.push(EnvUsageFact {
                            line: 0,
                            var_name: name.to_string(),
                            in_function: "global".to_string(),
                            access_method: "compose_environment".to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_env_maps(doc: &Value, facts: &mut ExtractedFacts) {
    if let Some(env) = doc.get("env").and_then(Value::as_mapping) {
        for (key, _value) in env {
            if let Some(name) = key.as_str() {
                facts.env_usages.push(EnvUsageFact {
                    line: 0,
                    var_name: name.to_string(),
                    in_function: "global".to_string(),
                    access_method: "workflow_env".to_string(),
                });
            }
        }
    }
}

/// `${{ … }}` expressions inside a workflow run script.
fn interpolations(script: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = script;
    while let Some(start) = rest.find("${{") {
        let after = &rest[start + 3..];
        match after.find("}}") {
            Some(end) => {
                let expr = after[..end].trim().to_string();
                if !expr.is_empty() && !out.contains(&expr) {
                    out.push(expr);
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_run_interpolations_are_inputs() {
        let content = "on: push\njobs:\n  build:\n    steps:\n      - uses: actions/checkout@v4\n      - run: echo \"${{ github.event.issue.title }}\"\n";
        let file = FileInfo {
            path: ".github/workflows/ci.yml".into(),
            ext: ".yml".into(),
            bytes: 0,
        };
        let facts = YamlExtractor.extract(&file, content).unwrap();
        assert!(facts.refs.iter().any(|r| r.kind == "action"));
        assert!(facts
            .env_usages
            .iter()
            .any(|e| e.var_name == "github.event.issue.title"));
    }

    #[test]
    fn compose_services_yield_images_and_env() {
        let content = "services:\n  db:\n    image: postgres:16\n    environment:\n      - POSTGRES_PASSWORD=secret\n";
        let file =
            FileInfo { path: "docker-compose.yml".into(), ext: ".yml".into(), bytes: 0 };
        let facts = YamlExtractor.extract(&file, content).unwrap();
        assert!(facts.refs.iter().any(|r| r.value == "postgres:16"));
        assert!(facts.env_usages.iter().any(|e| e.var_name == "POSTGRES_PASSWORD"));
    }
}
