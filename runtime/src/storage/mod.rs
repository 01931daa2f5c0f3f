use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{model::EntityFileData, value_help::ExternalService};

pub mod io;

pub use io::*;

const METADATA_FILE: &str = "metadata.xml";
const DATA_DIR: &str = "data";

/// Persists decomposed records as mock data files.
#[async_trait]
pub trait MockDataWriter: Send + Sync {
    /// One JSON array file per entity set, returns the written paths.
    async fn write_entity_data(&self, data: &EntityFileData) -> Result<Vec<PathBuf>>;

    /// Metadata plus one data file per fetched entity set, per service.
    async fn write_value_help(&self, services: &[ExternalService]) -> Result<Vec<PathBuf>>;
}

#[derive(Clone, Debug)]
pub struct JsonFileWriterConfig {
    /// Directory receiving `{EntitySet}.json` of the main service.
    pub data_dir: PathBuf,
    /// Directory receiving one folder per value help service.
    pub value_help_dir: PathBuf,
}

pub struct JsonFileWriter {
    data_dir: PathBuf,
    value_help_dir: PathBuf,
}

impl JsonFileWriter {
    pub fn new(config: JsonFileWriterConfig) -> Self {
        let JsonFileWriterConfig {
            data_dir,
            value_help_dir,
        } = config;
        Self {
            data_dir,
            value_help_dir,
        }
    }

    pub fn entity_file(&self, entity_set: &str) -> PathBuf {
        self.data_dir.join(format!("{entity_set}.json"))
    }

    pub fn service_dir(&self, folder: &str) -> PathBuf {
        self.value_help_dir.join(folder)
    }
}

/// Folder per distinct service path. Paths sharing a folder name are told
/// apart by a suffix derived from the full path.
pub fn service_folders<'p>(
    paths: impl IntoIterator<Item = &'p str>,
) -> BTreeMap<&'p str, String> {
    let mut by_name: BTreeMap<String, BTreeSet<&'p str>> = BTreeMap::new();
    for path in paths {
        by_name.entry(service_folder(path)).or_default().insert(path);
    }

    let mut folders = BTreeMap::new();
    for (name, paths) in by_name {
        let unique = paths.len() == 1;
        for path in paths {
            let folder = if unique {
                name.clone()
            } else {
                format!("{name}_{}", path_digest(path))
            };
            folders.insert(path, folder);
        }
    }
    folders
}

fn path_digest(path: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(path.as_bytes()));
    digest[..8].to_string()
}

/// Folder name for a service path: its last non-version segment.
///
/// `/sap/opu/odata4/sap/x/srvd_f4/sap/i_agency/0001;ps='a'/` -> `i_agency`
pub fn service_folder(service_path: &str) -> String {
    let segment = service_path
        .split('/')
        .map(|segment| segment.split(';').next().unwrap_or_default())
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .next_back()
        .unwrap_or("service");

    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl MockDataWriter for JsonFileWriter {
    async fn write_entity_data(&self, data: &EntityFileData) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(data.len());
        for (entity_set, records) in data.iter() {
            let path = self.entity_file(entity_set);
            write_json_file(&path, records)
                .await
                .with_context(|| format!("failed to write mock data {}", path.display()))?;
            info!(path = %path.display(), records = records.len(), "wrote mock data");
            written.push(path);
        }
        Ok(written)
    }

    async fn write_value_help(&self, services: &[ExternalService]) -> Result<Vec<PathBuf>> {
        let folders = service_folders(services.iter().map(|service| service.path.as_str()));
        let mut written = Vec::new();
        for service in services {
            let folder = folders
                .get(service.path.as_str())
                .with_context(|| format!("no output folder for {}", service.path))?;
            let dir = self.service_dir(folder);

            let metadata_path = dir.join(METADATA_FILE);
            write_text_file(&metadata_path, &service.metadata)
                .await
                .with_context(|| format!("failed to write {}", metadata_path.display()))?;
            written.push(metadata_path);

            for entity in &service.entity_data {
                let path = dir
                    .join(DATA_DIR)
                    .join(format!("{}.json", entity.entity_set_name));
                write_json_file(&path, &entity.items)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                written.push(path);
            }
            info!(
                service_path = %service.path,
                dir = %dir.display(),
                entity_sets = service.entity_data.len(),
                "wrote value help service"
            );
        }
        Ok(written)
    }
}
