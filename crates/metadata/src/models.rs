//! Maven repository metadata document.
//!
//! Covers the `maven-metadata.xml` layout at group, artifact and snapshot
//! version level. Elements this model does not know are dropped on parse.

use crate::error::MetadataResult;
use serde::{Deserialize, Serialize};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Root `<metadata>` element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "metadata")]
pub struct Metadata {
    #[serde(rename = "@modelVersion", default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(rename = "groupId", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "artifactId", default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<Versioning>,
    #[serde(default, skip_serializing_if = "Plugins::is_empty")]
    pub plugins: Plugins,
}

/// `<versioning>` element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Versions::is_empty")]
    pub versions: Versions,
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(rename = "snapshotVersions", default, skip_serializing_if = "SnapshotVersions::is_empty")]
    pub snapshot_versions: SnapshotVersions,
}

/// `<versions>` list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub version: Vec<String>,
}

impl Versions {
    fn is_empty(&self) -> bool {
        self.version.is_empty()
    }
}

/// `<snapshot>` descriptor of the latest snapshot build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "buildNumber", default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u32>,
    #[serde(rename = "localCopy", default, skip_serializing_if = "Option::is_none")]
    pub local_copy: Option<bool>,
}

/// `<snapshotVersions>` list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersions {
    #[serde(rename = "snapshotVersion", default)]
    pub snapshot_version: Vec<SnapshotVersion>,
}

impl SnapshotVersions {
    fn is_empty(&self) -> bool {
        self.snapshot_version.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// `<plugins>` list of a plugin group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugins {
    #[serde(default)]
    pub plugin: Vec<Plugin>,
}

impl Plugins {
    fn is_empty(&self) -> bool {
        self.plugin.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(rename = "artifactId", default)]
    pub artifact_id: String,
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

impl Metadata {
    /// Parse a metadata document.
    pub fn from_xml(xml: &str) -> MetadataResult<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Serialize to the canonical form: XML declaration, two-space indent.
    pub fn to_xml(&self) -> MetadataResult<String> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("metadata"))?;
        serializer.indent(' ', 2);
        self.serialize(serializer)?;

        let mut xml = String::with_capacity(XML_DECLARATION.len() + body.len() + 1);
        xml.push_str(XML_DECLARATION);
        xml.push_str(&body);
        xml.push('\n');
        Ok(xml)
    }

    /// Merge `source` into this document. Returns true if anything changed.
    ///
    /// Versions, snapshot versions and plugins are unioned. Scalar
    /// versioning fields are taken from `source` when its `lastUpdated` is
    /// not older than ours, or when ours is unknown.
    pub fn merge(&mut self, source: &Metadata) -> bool {
        let mut changed = false;

        for (field, value) in [
            (&mut self.group_id, &source.group_id),
            (&mut self.artifact_id, &source.artifact_id),
            (&mut self.version, &source.version),
        ] {
            if field.is_none() && value.is_some() {
                field.clone_from(value);
                changed = true;
            }
        }

        for plugin in &source.plugins.plugin {
            if !self.plugins.plugin.iter().any(|p| p.prefix == plugin.prefix) {
                self.plugins.plugin.push(plugin.clone());
                changed = true;
            }
        }

        if let Some(source) = &source.versioning {
            if self.versioning.is_none() {
                changed = true;
            }
            changed |= self.versioning.get_or_insert_with(Versioning::default).merge(source);
        }

        changed
    }
}

impl Versioning {
    fn merge(&mut self, source: &Versioning) -> bool {
        let mut changed = false;

        for version in &source.versions.version {
            if !self.versions.version.contains(version) {
                self.versions.version.push(version.clone());
                changed = true;
            }
        }

        if self.last_updated.as_deref() == Some("null") {
            self.last_updated = None;
        }
        let mut source_updated = source.last_updated.clone().filter(|u| u != "null");
        if blank(&source_updated) {
            source_updated.clone_from(&self.last_updated);
        }

        let source_is_newer = blank(&self.last_updated)
            || source_updated.as_deref().unwrap_or_default()
                >= self.last_updated.as_deref().unwrap_or_default();
        if !source_is_newer {
            return changed;
        }

        changed = true;
        self.last_updated = source_updated;
        if source.release.is_some() {
            self.release.clone_from(&source.release);
        }
        if source.latest.is_some() {
            self.latest.clone_from(&source.latest);
        }
        if let Some(snapshot) = &source.snapshot {
            let target = self.snapshot.get_or_insert_with(Snapshot::default);
            target.timestamp.clone_from(&snapshot.timestamp);
            target.build_number = snapshot.build_number;
            target.local_copy = snapshot.local_copy;
        }
        for version in &source.snapshot_versions.snapshot_version {
            let existing = self
                .snapshot_versions
                .snapshot_version
                .iter_mut()
                .find(|v| v.classifier == version.classifier && v.extension == version.extension);
            match existing {
                Some(existing) => *existing = version.clone(),
                None => self.snapshot_versions.snapshot_version.push(version.clone()),
            }
        }

        changed
    }
}
