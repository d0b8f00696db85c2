//! Dockerfile extractor.
//!
//! Dockerfiles are a line-oriented plain-text format with no AST, so
//! line parsing is permitted here. Emits the verbatim config row, base
//! image references, and ENV/ARG declarations.

use seep_core::errors::ExtractError;

use super::{ConfigFileFact, EnvUsageFact, ExtractedFacts, Extractor, FileInfo, RefFact};

pub struct DockerExtractor;

impl Extractor for DockerExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".dockerfile"]
    }

    fn extract(&self, file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError> {
        let mut facts = ExtractedFacts::default();

        facts.config_file = Some(ConfigFileFact {
            content: content.to_string(),
            file_type: "dockerfile".to_string(),
            context_dir: Some(seep_core::paths::parent(&file.path)),
        });

        let mut continuation = String::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx as i64 + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Fold backslash continuations into one logical instruction.
            if let Some(stripped) = line.strip_suffix('\\') {
                continuation.push_str(stripped);
                continuation.push(' ');
                continue;
            }
            let logical = if continuation.is_empty() {
                line.to_string()
            } else {
                let mut full = std::mem::take(&mut continuation);
                full.push_str(line);
                full
            };

            let mut words = logical.split_whitespace();
            let Some(instruction) = words.next() else { continue };
            let rest: Vec<&str> = words.collect();

            match instruction.to_ascii_uppercase().as_str() {
                "FROM" => {
                    if let Some(image) = rest.first() {
                        facts.refs.push(RefFact {
                            kind: "docker_image".to_string(),
                            value: (*image).to_string(),
                            line: Some(line_no),
                        });
                    }
                }
                "ENV" | "ARG" => {
                    for decl in &rest {
                        let name = decl.split('=').next().unwrap_or(decl);
                        if name.is_empty() {
                            continue;
                        }
                        facts.env_usages.push(EnvUsageFact {
                            line: line_no,
                            var_name: name.to_string(),
                            in_function: "global".to_string(),
                            access_method: instruction.to_ascii_lowercase(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_image_and_env_extracted() {
        let content = "FROM node:20-alpine\nENV PORT=3000 HOST=0.0.0.0\nARG BUILD_SHA\nRUN npm ci\n";
        let file =
            FileInfo { path: "svc/Dockerfile".into(), ext: String::new(), bytes: 0 };
        let facts = DockerExtractor.extract(&file, content).unwrap();

        assert!(facts.refs.iter().any(|r| r.value == "node:20-alpine"));
        let env_names: Vec<&str> =
            facts.env_usages.iter().map(|e| e.var_name.as_str()).collect();
        assert_eq!(env_names, ["PORT", "HOST", "BUILD_SHA"]);
        assert_eq!(facts.config_file.as_ref().unwrap().file_type, "dockerfile");
    }
}
