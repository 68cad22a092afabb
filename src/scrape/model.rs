//! # Records, listing items and registry entries.
//!
//! Every persisted field is optional so that a damaged record still decodes
//! and can be caught by the integrity check instead of failing the whole load.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Package metadata attached to a deployment once enrichment completes.
///
/// An empty manifest (every field `None`) marks a record that enrichment gave
/// up on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Package version; records without one stay out of the registry.
    pub version: Option<String>,
    /// Deployment environment label; `""` when the manifest carries none.
    pub env: Option<String>,
    /// Opaque route table.
    pub routes: Option<Value>,
    /// Opaque wrapper settings.
    pub wrapper: Option<Value>,
}

impl Manifest {
    /// Interprets a decoded manifest document.
    ///
    /// Returns `None` when the document has no usable `version`. `_env`,
    /// `_routes` and `_wrapper` map onto `env`, `routes` and `wrapper`.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let version = match doc.get("version")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let env = match doc.get("_env") {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        Some(Self {
            version: Some(version),
            env: Some(env),
            routes: doc.get("_routes").cloned(),
            wrapper: doc.get("_wrapper").cloned(),
        })
    }

    /// True for the marker written when enrichment gave up.
    pub fn is_empty(&self) -> bool {
        *self == Manifest::default()
    }
}

/// One deployment as kept in the record store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentRecord {
    /// Identity; equal to the listing `uid`.
    pub id: Option<String>,
    /// Creation time, epoch milliseconds.
    pub created: Option<i64>,
    /// Deployment name.
    pub name: Option<String>,
    /// Public url of the deployment.
    pub url: Option<String>,
    /// Package metadata, once enriched.
    pub pkg: Option<Manifest>,
}

impl DeploymentRecord {
    /// Name of the first field whose absence makes the record corrupt.
    ///
    /// Checked fields: `id`, `created`, `name`, `url`, `pkg.version`,
    /// `pkg.env`. Empty strings are valid values.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.id.is_none() {
            return Some("id");
        }
        if self.created.is_none() {
            return Some("created");
        }
        if self.name.is_none() {
            return Some("name");
        }
        if self.url.is_none() {
            return Some("url");
        }
        let Some(pkg) = &self.pkg else {
            return Some("pkg");
        };
        if pkg.version.is_none() {
            return Some("pkg.version");
        }
        if pkg.env.is_none() {
            return Some("pkg.env");
        }
        None
    }

    /// Non-empty package version, if enrichment found one.
    pub fn version(&self) -> Option<&str> {
        self.pkg
            .as_ref()
            .and_then(|p| p.version.as_deref())
            .filter(|v| !v.is_empty())
    }
}

/// One item of the external deployment listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDeployment {
    /// Remote identifier.
    pub uid: Option<String>,
    /// Deployment name.
    pub name: Option<String>,
    /// Public url; items without one are ignored.
    pub url: Option<String>,
    /// Creation time, epoch milliseconds.
    pub created: Option<i64>,
}

impl RawDeployment {
    /// Converts a listing item into a store record, without `pkg`.
    ///
    /// Returns `None` for items lacking a non-empty `uid` or `url`.
    pub fn into_record(self) -> Option<DeploymentRecord> {
        let id = self.uid.filter(|u| !u.is_empty())?;
        let url = self.url.filter(|u| !u.is_empty())?;
        Some(DeploymentRecord {
            id: Some(id),
            created: self.created,
            name: self.name,
            url: Some(url),
            pkg: None,
        })
    }
}

/// One entry of a deployment's file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name.
    pub file: String,
    /// Content-addressed identifier used to fetch the body.
    pub sha: String,
}

impl FileEntry {
    /// Creates a new entry.
    pub fn new(file: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            sha: sha.into(),
        }
    }
}

/// Newest deployment of one `(name, version, env)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub version: String,
    pub env: String,
    pub url: String,
    /// Epoch milliseconds.
    pub created: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full() -> DeploymentRecord {
        DeploymentRecord {
            id: Some("a".into()),
            created: Some(1),
            name: Some("svc".into()),
            url: Some("svc-a.example".into()),
            pkg: Some(Manifest {
                version: Some("1.0.0".into()),
                env: Some(String::new()),
                ..Manifest::default()
            }),
        }
    }

    #[test]
    fn empty_strings_are_not_missing() {
        let mut rec = full();
        rec.name = Some(String::new());
        assert_eq!(rec.missing_field(), None);
    }

    #[test]
    fn reports_first_missing_field() {
        let mut rec = full();
        rec.pkg.as_mut().unwrap().env = None;
        assert_eq!(rec.missing_field(), Some("pkg.env"));
        rec.created = None;
        assert_eq!(rec.missing_field(), Some("created"));

        let given_up = DeploymentRecord {
            pkg: Some(Manifest::default()),
            ..full()
        };
        assert_eq!(given_up.missing_field(), Some("pkg.version"));
    }

    #[test]
    fn manifest_maps_underscored_fields() {
        let doc = json!({"version": "2.1.0", "_routes": ["/a"], "_wrapper": {"x": 1}});
        let m = Manifest::from_document(&doc).unwrap();
        assert_eq!(m.version.as_deref(), Some("2.1.0"));
        assert_eq!(m.env.as_deref(), Some(""));
        assert_eq!(m.routes, Some(json!(["/a"])));
        assert_eq!(m.wrapper, Some(json!({"x": 1})));

        assert!(Manifest::from_document(&json!({"name": "x"})).is_none());
        assert!(Manifest::from_document(&json!({"version": ""})).is_none());
    }

    #[test]
    fn listing_items_without_url_are_dropped() {
        let raw = RawDeployment {
            uid: Some("a".into()),
            url: None,
            ..RawDeployment::default()
        };
        assert!(raw.into_record().is_none());

        let raw = RawDeployment {
            uid: Some("a".into()),
            url: Some("a.example".into()),
            name: Some("svc".into()),
            created: Some(5),
        };
        let rec = raw.into_record().unwrap();
        assert_eq!(rec.id.as_deref(), Some("a"));
        assert!(rec.pkg.is_none());
    }

    #[test]
    fn corrupt_record_still_decodes() {
        let rec: DeploymentRecord = serde_json::from_str(r#"{"id":"a","url":"u"}"#).unwrap();
        assert_eq!(rec.missing_field(), Some("created"));
    }
}
