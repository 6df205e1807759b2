//! Project configuration, read from an optional `sagyou.json` at the project
//! root. Every field has a default matching a stock MEAN.js layout, so an
//! empty or missing file is valid.

use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::manifest::AssetManifest;

pub const CONFIG_FILE: &str = "sagyou.json";

/// Application metadata shared with the templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppInfo {
    pub title: String,
    pub description: String,
    pub keywords: String,
    #[serde(rename = "googleAnalyticsTrackingID")]
    pub google_analytics_tracking_id: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            title: "KPER".into(),
            description: "Full-Stack JavaScript with MongoDB, Express, AngularJS, and Node.js"
                .into(),
            keywords: "MongoDB, Express, AngularJS, Node.js".into(),
            google_analytics_tracking_id: "GOOGLE_ANALYTICS_TRACKING_ID".into(),
        }
    }
}

/// The environment settings object of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub app: AppInfo,
    pub port: u16,
    pub template_engine: String,
    pub session_secret: String,
    pub session_collection: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppInfo::default(),
            port: 3000,
            template_engine: "swig".into(),
            session_secret: "MEAN".into(),
            session_collection: "sessions".into(),
        }
    }
}

impl Settings {
    /// Apply `PORT` and `GOOGLE_ANALYTICS_TRACKING_ID` overrides. Unset or
    /// empty variables leave the configured value in place.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::Override("PORT", port))?;
        }

        if let Some(id) = lookup("GOOGLE_ANALYTICS_TRACKING_ID") {
            self.app.google_analytics_tracking_id = id;
        }

        Ok(())
    }
}

/// Where the `build` alias writes its two bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub dir: Utf8PathBuf,
    pub script: String,
    pub style: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: "public/dist".into(),
            script: "application.min.js".into(),
            style: "application.min.css".into(),
        }
    }
}

/// The supervised application server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerOptions {
    pub script: Utf8PathBuf,
    pub node_args: Vec<String>,
    /// Extensions whose changes restart the server.
    pub ext: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            script: "server.js".into(),
            node_args: vec!["--debug".into()],
            ext: vec!["js".into(), "html".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InspectorOptions {
    pub web_port: u16,
    pub web_host: String,
    pub debug_port: u16,
    pub save_live_edit: bool,
    pub no_preload: bool,
    pub stack_trace_limit: u32,
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self {
            web_port: 1337,
            web_host: "localhost".into(),
            debug_port: 5858,
            save_live_edit: true,
            no_preload: true,
            stack_trace_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveReloadOptions {
    pub port: u16,
}

impl Default for LiveReloadOptions {
    fn default() -> Self {
        Self { port: 35729 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LintOptions {
    pub csslintrc: Utf8PathBuf,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            csslintrc: ".csslintrc".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestOptions {
    pub karma_config: Utf8PathBuf,
    pub protractor_config: Utf8PathBuf,
    pub mocha_reporter: String,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            karma_config: "karma.conf.js".into(),
            protractor_config: "protractor.conf.js".into(),
            mocha_reporter: "spec".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Module exporting `connect(callback)`, which connects to MongoDB and
    /// loads the application models.
    pub bootstrap: Utf8PathBuf,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            bootstrap: "config/lib/mongoose.js".into(),
        }
    }
}

/// Program names of the external tools. Relative names are looked up in
/// `node_modules/.bin` first, then in `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolPaths {
    pub node: String,
    pub jshint: String,
    pub csslint: String,
    pub lessc: String,
    pub esbuild: String,
    pub mocha: String,
    pub karma: String,
    pub protractor: String,
    pub webdriver_manager: String,
    pub node_inspector: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            node: "node".into(),
            jshint: "jshint".into(),
            csslint: "csslint".into(),
            lessc: "lessc".into(),
            esbuild: "esbuild".into(),
            mocha: "mocha".into(),
            karma: "karma".into(),
            protractor: "protractor".into(),
            webdriver_manager: "webdriver-manager".into(),
            node_inspector: "node-inspector".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub assets: AssetManifest,
    pub output: OutputOptions,
    pub server: ServerOptions,
    pub inspector: InspectorOptions,
    pub livereload: LiveReloadOptions,
    pub lint: LintOptions,
    pub testing: TestOptions,
    pub database: DatabaseOptions,
    pub tools: ToolPaths,
}

impl Config {
    /// Read `sagyou.json` from `root` if it exists, then apply environment
    /// variable overrides from the current process.
    pub fn load(root: &Utf8Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(root)?;
        config
            .settings
            .apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read `sagyou.json` from `root` without applying overrides.
    pub fn read(root: &Utf8Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("no {CONFIG_FILE} in {root}, using defaults");
            return Ok(Self::default());
        }

        let s = Instant::now();
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path, source })?;

        tracing::debug!("loaded {CONFIG_FILE} {}", crate::io::as_overhead(s));
        Ok(config)
    }
}
