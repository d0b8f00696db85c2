//! Generic configuration capture: verbatim `config_files` rows for
//! formats that drive configuration-aware extractors downstream.

use seep_core::errors::ExtractError;

use super::{ConfigFileFact, ExtractedFacts, Extractor, FileInfo};

pub struct GenericConfigExtractor;

impl Extractor for GenericConfigExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".json", ".toml", ".ini", ".env"]
    }

    fn extract(&self, file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError> {
        let file_type = match file.ext.as_str() {
            ".json" => {
                let name = file.path.rsplit('/').next().unwrap_or("");
                if name == "tsconfig.json" || name.starts_with("tsconfig.") {
                    "tsconfig"
                } else if name == "package.json" {
                    "package"
                } else {
                    "json"
                }
            }
            ".toml" => "toml",
            ".ini" => "ini",
            ".env" => "dotenv",
            _ => "config",
        };

        let mut facts = ExtractedFacts::default();
        facts.config_file = Some(ConfigFileFact {
            content: content.to_string(),
            file_type: file_type.to_string(),
            context_dir: Some(seep_core::paths::parent(&file.path)),
        });
        Ok(facts)
    }
}
