//! The asset manifest: named groups of glob patterns describing where the
//! project keeps its views, scripts, style sheets and tests.

use std::collections::HashSet;
use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// A named glob group of the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    ServerViews,
    ServerJs,
    ServerConfig,
    ClientViews,
    ClientJs,
    ClientCss,
    ClientSass,
    ClientLess,
    TestsServer,
    TestsClient,
    TestsE2e,
}

impl Group {
    pub const ALL: [Group; 11] = [
        Group::ServerViews,
        Group::ServerJs,
        Group::ServerConfig,
        Group::ClientViews,
        Group::ClientJs,
        Group::ClientCss,
        Group::ClientSass,
        Group::ClientLess,
        Group::TestsServer,
        Group::TestsClient,
        Group::TestsE2e,
    ];

    /// Dotted category name, e.g. `client.sass`.
    pub fn key(self) -> &'static str {
        match self {
            Group::ServerViews => "server.views",
            Group::ServerJs => "server.allJS",
            Group::ServerConfig => "server.config",
            Group::ClientViews => "client.views",
            Group::ClientJs => "client.js",
            Group::ClientCss => "client.css",
            Group::ClientSass => "client.sass",
            Group::ClientLess => "client.less",
            Group::TestsServer => "tests.server",
            Group::TestsClient => "tests.client",
            Group::TestsE2e => "tests.e2e",
        }
    }
}

impl Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerAssets {
    pub views: Vec<String>,
    #[serde(rename = "allJS")]
    pub all_js: Vec<String>,
    pub config: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientAssets {
    pub views: Vec<String>,
    pub js: Vec<String>,
    pub css: Vec<String>,
    pub sass: Vec<String>,
    pub less: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestAssets {
    pub server: Vec<String>,
    pub client: Vec<String>,
    pub e2e: Vec<String>,
}

/// Glob groups over the project files. Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetManifest {
    pub server: ServerAssets,
    pub client: ClientAssets,
    pub tests: TestAssets,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl Default for ServerAssets {
    fn default() -> Self {
        Self {
            views: strings(&["modules/*/server/views/*.html"]),
            all_js: strings(&["server.js", "config/**/*.js", "modules/*/server/**/*.js"]),
            config: strings(&["modules/*/server/config/*.js"]),
        }
    }
}

impl Default for ClientAssets {
    fn default() -> Self {
        Self {
            views: strings(&["modules/*/client/views/**/*.html"]),
            js: strings(&[
                "public/config.js",
                "public/application.js",
                "modules/*/client/*.js",
                "modules/*/client/**/*.js",
            ]),
            css: strings(&["modules/*/client/css/*.css"]),
            sass: strings(&["modules/*/client/scss/*.scss"]),
            less: strings(&["modules/*/client/less/*.less"]),
        }
    }
}

impl Default for TestAssets {
    fn default() -> Self {
        Self {
            server: strings(&["modules/*/tests/server/**/*.js"]),
            client: strings(&["modules/*/tests/client/**/*.js"]),
            e2e: strings(&["modules/*/tests/e2e/**/*.js"]),
        }
    }
}

impl AssetManifest {
    /// Patterns of a single group, in declaration order.
    pub fn patterns(&self, group: Group) -> &[String] {
        match group {
            Group::ServerViews => &self.server.views,
            Group::ServerJs => &self.server.all_js,
            Group::ServerConfig => &self.server.config,
            Group::ClientViews => &self.client.views,
            Group::ClientJs => &self.client.js,
            Group::ClientCss => &self.client.css,
            Group::ClientSass => &self.client.sass,
            Group::ClientLess => &self.client.less,
            Group::TestsServer => &self.tests.server,
            Group::TestsClient => &self.tests.client,
            Group::TestsE2e => &self.tests.e2e,
        }
    }

    /// Patterns of several groups joined together. Duplicates are dropped,
    /// the first occurrence keeps its position.
    pub fn union(&self, groups: &[Group]) -> Vec<&str> {
        let mut seen = HashSet::new();
        groups
            .iter()
            .flat_map(|&group| self.patterns(group))
            .map(String::as_str)
            .filter(|pattern| seen.insert(*pattern))
            .collect()
    }

    /// Expand groups into the files that currently exist under `root`.
    ///
    /// Files keep the order of the patterns that matched them first; within
    /// a single pattern the order is the one `glob` yields (sorted).
    pub fn expand(
        &self,
        root: &Utf8Path,
        groups: &[Group],
    ) -> Result<Vec<Utf8PathBuf>, ManifestError> {
        let prefix = Pattern::escape(root.as_str());
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in self.union(groups) {
            let full = format!("{prefix}/{pattern}");
            for path in glob::glob(&full)? {
                let path = Utf8PathBuf::try_from(path?)?;
                if path.is_file() && seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }
}
