// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for publishing to TestRail.
//!
//! Settings are layered, from lowest to highest priority:
//!
//! 1. The defaults in [`TestRailConfig::DEFAULT_CONFIG`].
//! 2. `.config/testrail.toml` in the workspace root, or an explicitly provided file.
//! 3. Environment variables prefixed with `NEXTEST_TESTRAIL_`.
//! 4. [`ConfigOverrides`], typically from the command line.

use crate::{
    client::HttpClientSettings,
    controller::{ControllerSettings, PublishTarget},
    errors::ConfigParseError,
    register::Register,
    session::SessionSettings,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState,
};
use serde::Deserialize;
use std::time::Duration;

/// TestRail settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TestRailConfig {
    /// The address of the TestRail instance.
    pub url: String,

    /// The account e-mail address.
    pub email: String,

    /// The account password or API key.
    pub password: String,

    /// The request timeout, in seconds.
    pub timeout: u64,

    /// Whether to verify TestRail's TLS certificate.
    pub verify_tls: bool,

    /// An existing run to publish to. 0 means unset.
    pub run_id: u64,

    /// An existing plan to publish to. 0 means unset.
    pub plan_id: u64,

    /// The project new runs are created in.
    #[serde(default)]
    pub project_id: Option<u64>,

    /// The suite new runs are created from.
    #[serde(default)]
    pub suite_id: Option<u64>,

    /// The user new runs are assigned to.
    #[serde(default)]
    pub assignee_id: Option<u64>,

    /// The milestone new runs belong to.
    #[serde(default)]
    pub milestone_id: Option<u64>,

    /// The name of new runs.
    #[serde(default)]
    pub run_name: Option<String>,

    /// The description of new runs.
    pub run_description: String,

    /// Whether new runs include every case of the suite.
    pub include_all: bool,

    /// The version of the software under test.
    #[serde(default)]
    pub version: Option<String>,

    /// Text added to the comment of every result.
    #[serde(default)]
    pub custom_comment: Option<String>,

    /// Whether to publish results for cases that are blocked in the run.
    pub publish_blocked: bool,

    /// Whether to skip tests whose cases aren't part of the configured run.
    pub skip_missing: bool,

    /// Whether to close the run or plan once results are published.
    pub close_on_complete: bool,

    /// The stem of the register file name.
    pub store_name: String,
}

impl TestRailConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/testrail.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Environment configuration uses this prefix, plus a _.
    pub const ENVIRONMENT_PREFIX: &'static str = "NEXTEST_TESTRAIL";

    /// Reads the config from `file`, or if not specified from `.config/testrail.toml` in the
    /// workspace root, and layers the environment and `overrides` on top.
    ///
    /// An explicitly specified file must exist; the default file is optional.
    pub fn from_sources(
        workspace_root: &Utf8Path,
        file: Option<&Utf8Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(workspace_root, file, overrides, None)
    }

    fn from_sources_impl(
        workspace_root: &Utf8Path,
        file: Option<&Utf8Path>,
        overrides: ConfigOverrides,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        // Values stay strings here. Typed fields are converted on deserialization, so string
        // fields such as the password keep leading zeros.
        let environment = Environment::with_prefix(Self::ENVIRONMENT_PREFIX).source(env);

        Self::build_and_deserialize(
            Self::make_default_config()
                .add_source(source)
                .add_source(environment),
            overrides,
        )
        .map_err(|err| ConfigParseError::new(config_file, err))
    }

    /// Returns the default config, with no files, environment or overrides applied.
    pub fn default_config() -> Result<Self, ConfigParseError> {
        Self::build_and_deserialize(Self::make_default_config(), ConfigOverrides::default())
            .map_err(|err| ConfigParseError::new("<default config>", err))
    }

    /// Returns the settings for an [`HttpClient`](crate::client::HttpClient).
    pub fn http_client_settings(&self) -> HttpClientSettings {
        HttpClientSettings {
            base_url: self.url.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout),
            verify_tls: self.verify_tls,
        }
    }

    /// Returns the settings for a [`TestRailController`](crate::controller::TestRailController).
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            target: PublishTarget::from_ids(self.run_id, self.plan_id),
            publish_blocked: self.publish_blocked,
            include_all: self.include_all,
            version: self.version.clone(),
            custom_comment: self.custom_comment.clone(),
            run_name: self.run_name.clone(),
            overridden_plan_id: (self.run_id != 0 && self.plan_id != 0).then_some(self.plan_id),
        }
    }

    /// Returns the settings for a [`TestRailSession`](crate::session::TestRailSession).
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            project_id: self.project_id.unwrap_or_default(),
            suite_id: self.suite_id.unwrap_or_default(),
            assignee_id: self.assignee_id,
            milestone_id: self.milestone_id,
            run_description: self.run_description.clone(),
            close_on_complete: self.close_on_complete,
            skip_missing: self.skip_missing,
        }
    }

    /// Returns the register shared by the processes of a session started in `dir`.
    pub fn register(&self, dir: &Utf8Path) -> Register {
        Register::new(dir, &self.store_name)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize(
        builder: ConfigBuilder<DefaultState>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        overrides.apply(builder)?.build()?.try_deserialize()
    }
}

/// Settings that take precedence over every other source.
///
/// Unset fields leave the value from lower-priority sources in place.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overrides [`TestRailConfig::url`].
    pub url: Option<String>,
    /// Overrides [`TestRailConfig::email`].
    pub email: Option<String>,
    /// Overrides [`TestRailConfig::password`].
    pub password: Option<String>,
    /// Overrides [`TestRailConfig::timeout`].
    pub timeout: Option<u64>,
    /// Overrides [`TestRailConfig::verify_tls`].
    pub verify_tls: Option<bool>,
    /// Overrides [`TestRailConfig::run_id`].
    pub run_id: Option<u64>,
    /// Overrides [`TestRailConfig::plan_id`].
    pub plan_id: Option<u64>,
    /// Overrides [`TestRailConfig::project_id`].
    pub project_id: Option<u64>,
    /// Overrides [`TestRailConfig::suite_id`].
    pub suite_id: Option<u64>,
    /// Overrides [`TestRailConfig::assignee_id`].
    pub assignee_id: Option<u64>,
    /// Overrides [`TestRailConfig::milestone_id`].
    pub milestone_id: Option<u64>,
    /// Overrides [`TestRailConfig::run_name`].
    pub run_name: Option<String>,
    /// Overrides [`TestRailConfig::run_description`].
    pub run_description: Option<String>,
    /// Overrides [`TestRailConfig::include_all`].
    pub include_all: Option<bool>,
    /// Overrides [`TestRailConfig::version`].
    pub version: Option<String>,
    /// Overrides [`TestRailConfig::custom_comment`].
    pub custom_comment: Option<String>,
    /// Overrides [`TestRailConfig::publish_blocked`].
    pub publish_blocked: Option<bool>,
    /// Overrides [`TestRailConfig::skip_missing`].
    pub skip_missing: Option<bool>,
    /// Overrides [`TestRailConfig::close_on_complete`].
    pub close_on_complete: Option<bool>,
    /// Overrides [`TestRailConfig::store_name`].
    pub store_name: Option<String>,
}

impl ConfigOverrides {
    fn apply(
        self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_override_option("url", self.url)?
            .set_override_option("email", self.email)?
            .set_override_option("password", self.password)?
            .set_override_option("timeout", self.timeout)?
            .set_override_option("verify_tls", self.verify_tls)?
            .set_override_option("run_id", self.run_id)?
            .set_override_option("plan_id", self.plan_id)?
            .set_override_option("project_id", self.project_id)?
            .set_override_option("suite_id", self.suite_id)?
            .set_override_option("assignee_id", self.assignee_id)?
            .set_override_option("milestone_id", self.milestone_id)?
            .set_override_option("run_name", self.run_name)?
            .set_override_option("run_description", self.run_description)?
            .set_override_option("include_all", self.include_all)?
            .set_override_option("version", self.version)?
            .set_override_option("custom_comment", self.custom_comment)?
            .set_override_option("publish_blocked", self.publish_blocked)?
            .set_override_option("skip_missing", self.skip_missing)?
            .set_override_option("close_on_complete", self.close_on_complete)?
            .set_override_option("store_name", self.store_name)
    }
}

/// Returns the path of the config file read for `workspace_root` when none is given explicitly.
pub fn default_config_path(workspace_root: &Utf8Path) -> Utf8PathBuf {
    workspace_root.join(TestRailConfig::CONFIG_PATH)
}
