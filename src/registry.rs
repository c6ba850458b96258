use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    canonical::CanonicalField,
    error::RegistryError,
    profile::{FieldMapping, FieldParser, ProfileDocument, SchemaProfile},
};

/// Read-only set of source-format profiles, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<SchemaProfile>,
}

impl ProfileRegistry {
    pub fn new(profiles: Vec<SchemaProfile>) -> Result<Self, RegistryError> {
        if profiles.is_empty() {
            return Err(RegistryError::NoProfiles);
        }
        let mut seen = HashSet::new();
        for profile in &profiles {
            validate_profile(profile)?;
            if !seen.insert(profile.id.trim()) {
                return Err(RegistryError::DuplicateProfile {
                    id: profile.id.clone(),
                });
            }
        }
        Ok(Self { profiles })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let document = parse_document(yaml, "<inline>")?;
        Self::new(document.profiles)
    }

    /// Loads a single YAML document, or every `.yaml`/`.yml` file in a
    /// directory in file-name order.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let files = if path.is_dir() {
            profile_files_in(path)?
        } else {
            vec![path.to_path_buf()]
        };
        let mut profiles = Vec::new();
        for file in &files {
            let raw = fs::read_to_string(file).map_err(|source| RegistryError::Read {
                path: file.clone(),
                source,
            })?;
            let document = parse_document(&raw, &file.display().to_string())?;
            debug!(
                "Read {} profile(s) from {:?}",
                document.profiles.len(),
                file
            );
            profiles.extend(document.profiles);
        }
        let registry = Self::new(profiles)?;
        info!(
            "Loaded {} profile(s) from {:?}",
            registry.profiles.len(),
            path
        );
        Ok(registry)
    }

    pub fn lookup_all(&self) -> &[SchemaProfile] {
        &self.profiles
    }

    pub fn get(&self, id: &str) -> Option<&SchemaProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn parse_document(raw: &str, origin: &str) -> Result<ProfileDocument, RegistryError> {
    serde_yaml::from_str(raw).map_err(|source| RegistryError::Parse {
        origin: origin.to_string(),
        source,
    })
}

fn profile_files_in(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let read_err = |source| RegistryError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn validate_profile(profile: &SchemaProfile) -> Result<(), RegistryError> {
    let id = profile.id.trim();
    if id.is_empty() {
        return Err(RegistryError::EmptyIdentifier);
    }

    let mut fields = HashSet::new();
    for mapping in &profile.fields {
        if !fields.insert(mapping.field) {
            return Err(RegistryError::DuplicateField {
                id: id.to_string(),
                field: mapping.field,
            });
        }
        validate_mapping(id, mapping)?;
    }

    for core in CanonicalField::CORE {
        let required = profile.mapping(core).is_some_and(|m| m.required);
        if !required {
            return Err(RegistryError::MissingCoreField {
                id: id.to_string(),
                field: core,
            });
        }
    }
    Ok(())
}

fn validate_mapping(id: &str, mapping: &FieldMapping) -> Result<(), RegistryError> {
    let expected = mapping.field.canonical_type();
    if !mapping.parser.produces(expected) {
        return Err(RegistryError::IncompatibleParser {
            id: id.to_string(),
            field: mapping.field,
            parser: mapping.parser.kind(),
            expected,
        });
    }
    let invalid = |reason: String| RegistryError::InvalidField {
        id: id.to_string(),
        field: mapping.field,
        reason,
    };
    match &mapping.parser {
        FieldParser::Choice { values } if values.is_empty() => {
            Err(invalid("choice parser needs at least one value".to_string()))
        }
        FieldParser::Amount(format) => format.ensure_valid().map_err(invalid),
        _ => Ok(()),
    }
}
